//! Loaded ABC file: constant pools plus method and class tables

use std::rc::Rc;

use crate::error::DecodeError;
use crate::method::{ClassInfo, MethodInfo};
use crate::multiname::{Multiname, Namespace};

/// Constant pools of an ABC file
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// String constants
    pub strings: Vec<Rc<str>>,
    /// int constants
    pub ints: Vec<i32>,
    /// uint constants
    pub uints: Vec<u32>,
    /// double constants
    pub doubles: Vec<f64>,
    /// Namespace constants
    pub namespaces: Vec<Namespace>,
    /// Multiname constants
    pub multinames: Vec<Rc<Multiname>>,
}

fn lookup<'a, T>(pool: &'a [T], index: u32, name: &'static str) -> Result<&'a T, DecodeError> {
    pool.get(index as usize)
        .ok_or(DecodeError::BadIndex { pool: name, index })
}

/// A loaded ABC file.
///
/// Methods hold a weak link back to the file so that instructions such as
/// `NEWFUNCTION` and `NEWCLASS` can reach the method and class tables.
#[derive(Debug)]
pub struct AbcFile {
    pool: ConstantPool,
    methods: Vec<Rc<MethodInfo>>,
    classes: Vec<Rc<ClassInfo>>,
}

impl AbcFile {
    /// Assemble a file, linking every method back to it
    pub fn new(pool: ConstantPool, methods: Vec<MethodInfo>, classes: Vec<ClassInfo>) -> Rc<Self> {
        Rc::new_cyclic(|weak| {
            let methods = methods
                .into_iter()
                .map(|mut method| {
                    method.abc = weak.clone();
                    Rc::new(method)
                })
                .collect();
            AbcFile {
                pool,
                methods,
                classes: classes.into_iter().map(Rc::new).collect(),
            }
        })
    }

    /// Constant pools
    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Method by index
    pub fn method(&self, index: u32) -> Result<&Rc<MethodInfo>, DecodeError> {
        lookup(&self.methods, index, "method")
    }

    /// All methods
    pub fn methods(&self) -> &[Rc<MethodInfo>] {
        &self.methods
    }

    /// Class by index
    pub fn class(&self, index: u32) -> Result<&Rc<ClassInfo>, DecodeError> {
        lookup(&self.classes, index, "class")
    }

    /// String constant
    pub fn string(&self, index: u32) -> Result<&Rc<str>, DecodeError> {
        lookup(&self.pool.strings, index, "string")
    }

    /// int constant
    pub fn int(&self, index: u32) -> Result<i32, DecodeError> {
        lookup(&self.pool.ints, index, "int").copied()
    }

    /// uint constant
    pub fn uint(&self, index: u32) -> Result<u32, DecodeError> {
        lookup(&self.pool.uints, index, "uint").copied()
    }

    /// double constant
    pub fn double(&self, index: u32) -> Result<f64, DecodeError> {
        lookup(&self.pool.doubles, index, "double").copied()
    }

    /// Namespace constant
    pub fn namespace(&self, index: u32) -> Result<&Namespace, DecodeError> {
        lookup(&self.pool.namespaces, index, "namespace")
    }

    /// Multiname constant
    pub fn multiname(&self, index: u32) -> Result<&Rc<Multiname>, DecodeError> {
        lookup(&self.pool.multinames, index, "multiname")
    }
}
