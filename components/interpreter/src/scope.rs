//! Scope chain and per-frame scope stack
//!
//! A [`Scope`] node is immutable apart from its default XML namespace and is
//! shared by every closure created while it is live. A [`ScopeStack`] is the
//! frame-local log of `PUSHSCOPE`/`PUSHWITH` entries; it materializes the
//! chain lazily and memoizes the nodes so repeated lookups with an
//! unchanged stack return the same node.

use std::cell::RefCell;
use std::rc::Rc;

use bytecode_system::{Namespace, NamespaceKind};
use core_types::Value;

/// One link of a scope chain
#[derive(Debug)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    object: Value,
    is_with: bool,
    default_namespace: RefCell<Option<Namespace>>,
}

impl Scope {
    /// Root scope holding the global object
    pub fn global(object: Value) -> Rc<Scope> {
        Rc::new(Scope {
            parent: None,
            object,
            is_with: false,
            default_namespace: RefCell::new(None),
        })
    }

    /// New innermost scope on top of `self`
    pub fn extend(self: &Rc<Self>, object: Value, is_with: bool) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(Rc::clone(self)),
            object,
            is_with,
            default_namespace: RefCell::new(None),
        })
    }

    /// Enclosing scope
    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Scope object
    pub fn object(&self) -> &Value {
        &self.object
    }

    /// Whether this scope came from `PUSHWITH`
    pub fn is_with(&self) -> bool {
        self.is_with
    }

    /// Whether this is the root of the chain
    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    /// Object of the root scope
    pub fn global_object(&self) -> &Value {
        let mut scope = self;
        while let Some(parent) = &scope.parent {
            scope = parent;
        }
        &scope.object
    }

    /// Number of links above the root
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// This scope and its parents, innermost first
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Default XML namespace, searching outward
    pub fn default_namespace(&self) -> Option<Namespace> {
        self.ancestors()
            .find_map(|scope| scope.default_namespace.borrow().clone())
    }

    /// Set the default XML namespace of this scope
    pub fn set_default_namespace(&self, uri: Rc<str>) {
        *self.default_namespace.borrow_mut() = Some(Namespace::new(NamespaceKind::Namespace, uri));
    }
}

/// Iterator over a scope and its parents
pub struct Ancestors<'a> {
    next: Option<&'a Scope>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<&'a Scope> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

fn same_object(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

/// Frame-local scope stack
#[derive(Debug)]
pub struct ScopeStack {
    parent: Rc<Scope>,
    entries: Vec<(Value, bool)>,
    chain: Vec<Rc<Scope>>,
}

impl ScopeStack {
    /// Empty stack over the method's saved scope
    pub fn new(parent: Rc<Scope>) -> Self {
        Self {
            parent,
            entries: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// The saved scope the stack sits on
    pub fn parent(&self) -> &Rc<Scope> {
        &self.parent
    }

    /// Push a scope object
    pub fn push(&mut self, object: Value, is_with: bool) {
        self.entries.push((object, is_with));
    }

    /// Pop the innermost entry
    pub fn pop(&mut self) -> Option<Value> {
        let (object, _) = self.entries.pop()?;
        self.chain.truncate(self.entries.len());
        Some(object)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.chain.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index from the bottom
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(object, _)| object)
    }

    /// Innermost scope node, building missing links on demand.
    pub fn top_scope(&mut self) -> Rc<Scope> {
        let mut current = Rc::clone(&self.parent);
        for (i, (object, is_with)) in self.entries.iter().enumerate() {
            let reusable = self.chain.get(i).is_some_and(|node| {
                node.is_with == *is_with
                    && same_object(&node.object, object)
                    && node.parent.as_ref().is_some_and(|p| Rc::ptr_eq(p, &current))
            });
            if !reusable {
                self.chain.truncate(i);
                self.chain.push(current.extend(object.clone(), *is_with));
            }
            current = Rc::clone(&self.chain[i]);
        }
        current
    }
}
