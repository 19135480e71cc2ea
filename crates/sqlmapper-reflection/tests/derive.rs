//! Tests for `#[derive(Reflect)]` and path access over derived types.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use sqlmapper_reflection::{
    MetaObject, MetaObjectMut, Property, Reflect, ReflectionError, ReflectorFactory, Value,
};

#[derive(Reflect, Default, Debug, PartialEq)]
struct Address {
    city: String,
    zip: Option<String>,
}

#[derive(Reflect, Default, Debug)]
struct Customer {
    id: i64,
    #[sqlmapper(rename = "userName")]
    name: String,
    #[sqlmapper(readonly)]
    created_by: String,
    #[sqlmapper(skip)]
    #[allow(dead_code)]
    password_hash: String,
    address: Option<Address>,
    tags: Vec<String>,
    attributes: HashMap<String, Value>,
}

#[test]
fn test_descriptor_shape() {
    let descriptor = Customer::descriptor();
    let names: Vec<_> = descriptor.properties.iter().map(|p| p.name).collect();
    assert_eq!(
        names,
        ["id", "userName", "created_by", "address", "tags", "attributes"]
    );
    assert_eq!(descriptor.type_name, "Customer");
    assert_eq!(descriptor.properties[3].type_name, "Option<Address>");
    assert!(descriptor.properties[2].get_mut.is_none());
}

#[test]
fn test_reflector_is_shared() {
    let customer = Customer::default();
    let a = customer.reflector();
    let b = ReflectorFactory::global().find_for::<Customer>();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.has_getter("USERNAME"));
    assert!(!a.has_getter("password_hash"));
    assert!(!a.has_setter("created_by"));
}

#[test]
fn test_read_paths() {
    let customer = Customer {
        id: 7,
        name: "alice".into(),
        address: Some(Address {
            city: "Oslo".into(),
            zip: None,
        }),
        tags: vec!["vip".into(), "early".into()],
        ..Customer::default()
    };
    let meta = MetaObject::new(&customer);

    assert_eq!(meta.get_value("id").unwrap().to_value(), Value::Int(7));
    assert_eq!(
        meta.get_value("username").unwrap().to_value(),
        Value::from("alice")
    );
    assert_eq!(
        meta.get_value("address.city").unwrap().to_value(),
        Value::from("Oslo")
    );
    assert!(meta.get_value("address.zip").unwrap().is_null());
    assert_eq!(
        meta.get_value("tags[1]").unwrap().to_value(),
        Value::from("early")
    );
}

#[test]
fn test_unknown_property() {
    let customer = Customer::default();
    let err = MetaObject::new(&customer)
        .get_value("nickname")
        .err()
        .unwrap();
    assert_eq!(
        err,
        ReflectionError::NoGetter {
            property: "nickname".into(),
            type_name: "Customer"
        }
    );
}

#[test]
fn test_null_nested_object() {
    let customer = Customer::default();
    let err = MetaObject::new(&customer)
        .get_value("address.city")
        .err()
        .unwrap();
    assert!(matches!(err, ReflectionError::NullIntermediate { .. }));
}

#[test]
fn test_write_paths() {
    let mut customer = Customer::default();
    let mut meta = MetaObjectMut::new(&mut customer);

    meta.set_value("USERNAME", Value::from("bob")).unwrap();
    meta.set_value("address.city", Value::from("Bergen")).unwrap();
    meta.set_value("attributes.level", Value::from(3)).unwrap();
    meta.set_value("attributes.meta.source", Value::from("import"))
        .unwrap();
    assert!(matches!(
        meta.set_value("created_by", Value::from("x")),
        Err(ReflectionError::NoSetter { .. })
    ));

    assert_eq!(customer.name, "bob");
    assert_eq!(
        customer.address,
        Some(Address {
            city: "Bergen".into(),
            zip: None
        })
    );
    assert_eq!(customer.attributes["level"], Value::Int(3));
    assert_eq!(
        customer.attributes["meta"],
        Value::map([("source", "import")])
    );
}

#[test]
fn test_write_without_auto_instantiate() {
    let mut customer = Customer::default();
    let err = MetaObjectMut::new(&mut customer)
        .auto_instantiate(false)
        .set_value("address.city", Value::from("Bergen"))
        .unwrap_err();
    assert_eq!(
        err,
        ReflectionError::NullIntermediate {
            path: "address.city".into(),
            segment: "address".into()
        }
    );
    assert!(customer.address.is_none());
}

#[test]
fn test_assign_whole_object() {
    let mut address = Address::default();
    address
        .assign(Value::map([("city", Value::from("Rome")), ("zip", Value::from("00100"))]))
        .unwrap();
    assert_eq!(address.zip.as_deref(), Some("00100"));

    let snapshot = address.to_value();
    assert_eq!(snapshot.to_string(), "{city=Rome, zip=00100}");
}

#[test]
fn test_find_property_camel_case() {
    let customer = Customer {
        address: Some(Address::default()),
        ..Customer::default()
    };
    let meta = MetaObject::new(&customer);
    assert_eq!(
        meta.find_property("USER_NAME", true).as_deref(),
        Some("userName")
    );
    assert_eq!(meta.find_property("USER_NAME", false), None);
    assert_eq!(
        meta.find_property("ADDRESS.CITY", false).as_deref(),
        Some("address.city")
    );
}
