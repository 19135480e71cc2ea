//! # sqlmapper-reflection
//!
//! Cached property access over host objects.
//!
//! Statement templates refer to parameter values by property path
//! (`user.address.city`, `ids[0]`, `filters['name']`). This crate resolves
//! those paths against arbitrary host values without per-call introspection:
//!
//! - [`Value`] is the owned dynamic value model.
//! - [`Property`] is the capability every reachable value implements; it is
//!   provided for primitives, strings, `Option`, `Box`, `Vec`, string-keyed
//!   maps and [`Value`] itself.
//! - [`Reflect`] marks structs with named properties and is normally derived
//!   with `#[derive(Reflect)]`.
//! - [`ReflectorFactory`] caches one [`Reflector`] per type. Concurrent first
//!   use builds it exactly once.
//! - [`MetaObject`] and [`MetaObjectMut`] read and write nested paths.
//!
//! ## Example
//!
//! ```rust
//! use sqlmapper_reflection::{MetaObject, MetaObjectMut, Property, Reflect, Value};
//!
//! #[derive(Reflect, Default)]
//! struct Address {
//!     city: String,
//! }
//!
//! #[derive(Reflect, Default)]
//! struct User {
//!     name: String,
//!     #[sqlmapper(rename = "homeAddress")]
//!     address: Option<Address>,
//! }
//!
//! let mut user = User::default();
//! MetaObjectMut::new(&mut user).set_value("homeAddress.city", Value::from("Oslo"))?;
//!
//! let meta = MetaObject::new(&user);
//! assert_eq!(meta.get_value("HOMEADDRESS.city")?.to_value(), Value::from("Oslo"));
//! # Ok::<(), sqlmapper_reflection::ReflectionError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// Lets `#[derive(Reflect)]` refer to `::sqlmapper_reflection` inside this crate.
extern crate self as sqlmapper_reflection;

pub mod convert;
pub mod error;
pub mod meta_object;
pub mod path;
pub mod property;
pub mod reflector;
pub mod value;

pub use convert::FromValue;
pub use error::ReflectionError;
pub use meta_object::{MetaObject, MetaObjectMut, child};
pub use path::{PropertyPath, Segment};
pub use property::{Node, NodeMut, Property, PropertyList, PropertyMap};
pub use reflector::{
    ClassDescriptor, Getter, GetterMut, PropertyDescriptor, Reflect, Reflector, ReflectorFactory,
};
pub use value::Value;

#[cfg(feature = "derive")]
pub use sqlmapper_derive::Reflect;
