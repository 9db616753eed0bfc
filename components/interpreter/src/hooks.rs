//! Method hooks
//!
//! A hook is a callback attached to a method's `path/member` key at one of
//! two places: when the method begins or when it returns. Both execution
//! modes fire them; the compiler captures the slot at compile time so a hook
//! attached later still fires in already compiled code.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use core_types::Value;
use thiserror::Error;

/// Hook callback; receives the method's receiver
pub type MethodHook = Rc<dyn Fn(&Value)>;

/// Where a hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPlace {
    /// Before the first instruction
    Begin,
    /// At `RETURNVALUE` or `RETURNVOID`
    Return,
}

impl HookPlace {
    /// Parse `"begin"` or `"return"`
    pub fn parse(place: &str) -> Option<Self> {
        match place {
            "begin" => Some(HookPlace::Begin),
            "return" => Some(HookPlace::Return),
            _ => None,
        }
    }
}

/// Failure to attach a hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The path is empty or has no member part
    #[error("invalid hook path {0:?}, expected path/member")]
    InvalidPath(String),
    /// Unknown place name
    #[error("unknown hook place {0:?}")]
    InvalidPlace(String),
}

/// One attachment point
#[derive(Default)]
pub struct HookSlot {
    hook: RefCell<Option<MethodHook>>,
}

impl HookSlot {
    /// Run the hook if one is attached
    pub fn fire(&self, receiver: &Value) {
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            hook(receiver);
        }
    }

    /// Whether a hook is attached
    pub fn is_set(&self) -> bool {
        self.hook.borrow().is_some()
    }
}

impl fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlot").field("set", &self.is_set()).finish()
    }
}

/// Hooks keyed by method path and place
#[derive(Default, Debug)]
pub struct HookRegistry {
    slots: RefCell<HashMap<(Rc<str>, HookPlace), Rc<HookSlot>>>,
}

fn validate(path: &str) -> Result<(), HookError> {
    match path.rsplit_once('/') {
        Some((owner, member)) if !owner.is_empty() && !member.is_empty() => Ok(()),
        _ => Err(HookError::InvalidPath(path.to_string())),
    }
}

impl HookRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `hook` to `path` at `place`, replacing any previous one
    pub fn attach(&self, path: &str, place: HookPlace, hook: MethodHook) -> Result<(), HookError> {
        validate(path)?;
        let slot = self.slot(&Rc::from(path), place);
        *slot.hook.borrow_mut() = Some(hook);
        tracing::debug!(path, ?place, "method hook attached");
        Ok(())
    }

    /// Attach by place name (`"begin"` or `"return"`)
    pub fn attach_named(&self, path: &str, place: &str, hook: MethodHook) -> Result<(), HookError> {
        let place = HookPlace::parse(place).ok_or_else(|| HookError::InvalidPlace(place.to_string()))?;
        self.attach(path, place, hook)
    }

    /// Remove the hook at `path`/`place`
    pub fn detach(&self, path: &str, place: HookPlace) {
        if let Some(slot) = self.slots.borrow().get(&(Rc::from(path), place)) {
            slot.hook.borrow_mut().take();
        }
    }

    /// Slot for `path`/`place`, created empty when missing
    pub fn slot(&self, path: &Rc<str>, place: HookPlace) -> Rc<HookSlot> {
        let mut slots = self.slots.borrow_mut();
        Rc::clone(slots.entry((Rc::clone(path), place)).or_default())
    }

    /// Fire the hook at `path`/`place`, if any
    pub fn fire(&self, path: &Rc<str>, place: HookPlace, receiver: &Value) {
        let slot = self.slots.borrow().get(&(Rc::clone(path), place)).cloned();
        if let Some(slot) = slot {
            slot.fire(receiver);
        }
    }

    /// Whether no slot has ever been requested or attached
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}
