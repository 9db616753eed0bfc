//! Tests for AbcFile, multinames and method descriptors

use std::rc::Rc;

use bytecode_system::{
    AbcBuilder, ClassInfo, DecodeError, ExceptionInfo, MethodBody, MethodInfo, MethodOwner,
    Multiname, MultinameKind, Namespace, NamespaceKind,
};

#[test]
fn test_pool_accessors() {
    let mut abc = AbcBuilder::new();
    let s = abc.string("hello");
    let i = abc.int(-7);
    let u = abc.uint(7);
    let d = abc.double(2.5);
    let ns = abc.namespace(Namespace::new(NamespaceKind::Private, "p"));
    let file = abc.build();

    assert_eq!(&**file.string(s).unwrap(), "hello");
    assert_eq!(file.int(i).unwrap(), -7);
    assert_eq!(file.uint(u).unwrap(), 7);
    assert_eq!(file.double(d).unwrap(), 2.5);
    assert_eq!(file.namespace(ns).unwrap().kind, NamespaceKind::Private);
    assert!(matches!(
        file.double(9),
        Err(DecodeError::BadIndex { pool: "double", .. })
    ));
}

#[test]
fn test_multiname_ids_match_pool_positions() {
    let mut abc = AbcBuilder::new();
    let a = abc.public_name("a");
    let late = abc.multiname(Multiname::runtime(
        MultinameKind::MultinameL,
        None,
        vec![Namespace::public()],
    ));
    let file = abc.build();
    assert_eq!(file.multiname(a).unwrap().id, a);
    assert_eq!(file.multiname(late).unwrap().id, late);
    assert!(file.multiname(late).unwrap().is_runtime_name());
}

#[test]
fn test_methods_and_classes_are_indexed() {
    let mut abc = AbcBuilder::new();
    let name = abc.public_name("Point");
    let name_ref = abc.multiname_ref(name).unwrap();
    let ctor = abc.method(
        MethodInfo::new(99)
            .with_owner(MethodOwner::Instance("geom.Point".into()))
            .constructor()
            .with_body(MethodBody::new(vec![0x47], 1, 1)),
    );
    let class = abc.class(ClassInfo::new(42, Rc::clone(&name_ref), ctor).sealed());
    let file = abc.build();

    let method = file.method(ctor).unwrap();
    assert_eq!(method.index, ctor);
    assert_eq!(&*method.hook_path(), "geom/Point/constructor");
    let class = file.class(class).unwrap();
    assert_eq!(class.index, 0);
    assert!(class.sealed);
    assert_eq!(class.instance_initializer, ctor);
}

#[test]
fn test_body_scope_capacity_and_regions() {
    let body = MethodBody::new(vec![0x47], 1, 1)
        .with_scope_depth(2, 5)
        .with_exception(ExceptionInfo::catch_all(0, 1, 0));
    assert_eq!(body.scope_capacity(), 3);
    assert_eq!(body.exceptions.len(), 1);
}
