//! The property capability traits.
//!
//! Every value reachable through a property path implements [`Property`].
//! A property exposes a borrowed structural view ([`Node`]) that tells path
//! navigation whether it is null, a scalar, a list, a map or a reflected
//! object, and can be overwritten from a dynamic [`Value`].

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};

use crate::convert::FromValue;
use crate::error::ReflectionError;
use crate::reflector::Reflect;
use crate::value::Value;

/// Shared null used for absent map entries.
pub(crate) static NULL: Value = Value::Null;

/// Borrowed structural view of a property.
pub enum Node<'a> {
    /// No value.
    Null,
    /// A scalar, copied out as a dynamic value.
    Scalar(Value),
    /// An ordered collection.
    List(&'a dyn PropertyList),
    /// A string-keyed collection.
    Map(&'a dyn PropertyMap),
    /// A reflected object with named properties.
    Object(&'a dyn Reflect),
}

/// Mutable structural view of a property.
pub enum NodeMut<'a> {
    /// No value.
    Null,
    /// A scalar. Scalars are replaced through [`Property::assign`].
    Scalar,
    /// An ordered collection.
    List(&'a mut dyn PropertyList),
    /// A string-keyed collection.
    Map(&'a mut dyn PropertyMap),
    /// A reflected object with named properties.
    Object(&'a mut dyn Reflect),
}

/// A value that can be read and written through property paths.
pub trait Property: Send + Sync {
    /// Name of the concrete type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// Borrowed structural view.
    fn node(&self) -> Node<'_>;

    /// Mutable structural view.
    fn node_mut(&mut self) -> NodeMut<'_>;

    /// Overwrite this property from a dynamic value.
    fn assign(&mut self, value: Value) -> Result<(), ReflectionError>;

    /// Replace a null value with an empty default so a path can descend
    /// through it. Returns `false` when the type has no such default.
    fn instantiate(&mut self) -> bool {
        false
    }

    /// Check whether the property currently holds no value.
    fn is_null(&self) -> bool {
        matches!(self.node(), Node::Null)
    }

    /// Snapshot the property as an owned dynamic value.
    fn to_value(&self) -> Value {
        match self.node() {
            Node::Null => Value::Null,
            Node::Scalar(value) => value,
            Node::List(list) => (0..list.len())
                .map(|i| list.item(i).map_or(Value::Null, Property::to_value))
                .collect(),
            Node::Map(map) => map
                .sorted_keys()
                .into_iter()
                .map(|key| {
                    let value = map.lookup(&key).map_or(Value::Null, Property::to_value);
                    (key, value)
                })
                .collect(),
            Node::Object(object) => object.reflector().snapshot(object),
        }
    }
}

/// Ordered collection of properties.
pub trait PropertyList: Send + Sync {
    /// Number of items.
    fn len(&self) -> usize;

    /// Check for an empty collection.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the item at `index`.
    fn item(&self, index: usize) -> Option<&dyn Property>;

    /// Mutably borrow the item at `index`.
    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Property>;
}

/// String-keyed collection of properties.
pub trait PropertyMap: Send + Sync {
    /// Keys in ascending order.
    fn sorted_keys(&self) -> Vec<String>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Check for an empty collection.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the entry for `key`.
    fn lookup(&self, key: &str) -> Option<&dyn Property>;

    /// Mutably borrow the entry for `key`.
    fn lookup_mut(&mut self, key: &str) -> Option<&mut dyn Property>;

    /// Borrow the entry for `key`, inserting a default entry first if absent.
    fn entry_or_default(&mut self, key: &str) -> &mut dyn Property;

    /// Insert or replace the entry for `key`.
    fn insert_value(&mut self, key: &str, value: Value) -> Result<(), ReflectionError>;
}

macro_rules! impl_scalar_property {
    ($($t:ty),*) => {$(
        impl Property for $t {
            fn type_name(&self) -> &'static str {
                stringify!($t)
            }

            #[allow(clippy::clone_on_copy)]
            fn node(&self) -> Node<'_> {
                Node::Scalar(Value::from(self.clone()))
            }

            fn node_mut(&mut self) -> NodeMut<'_> {
                NodeMut::Scalar
            }

            fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
                *self = <$t>::from_value(value)?;
                Ok(())
            }
        }
    )*};
}

impl_scalar_property!(
    i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, char, String
);

#[cfg(feature = "decimal")]
impl_scalar_property!(rust_decimal::Decimal);

#[cfg(feature = "chrono")]
impl_scalar_property!(chrono::NaiveDate, chrono::NaiveTime, chrono::NaiveDateTime);

#[cfg(feature = "uuid")]
impl_scalar_property!(uuid::Uuid);

impl Property for Value {
    fn type_name(&self) -> &'static str {
        Value::type_name(self)
    }

    fn node(&self) -> Node<'_> {
        match self {
            Self::Null => Node::Null,
            Self::List(items) => Node::List(items),
            Self::Map(entries) => Node::Map(entries),
            scalar => Node::Scalar(scalar.clone()),
        }
    }

    fn node_mut(&mut self) -> NodeMut<'_> {
        match self {
            Self::Null => NodeMut::Null,
            Self::List(items) => NodeMut::List(items),
            Self::Map(entries) => NodeMut::Map(entries),
            _ => NodeMut::Scalar,
        }
    }

    fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
        *self = value;
        Ok(())
    }

    fn instantiate(&mut self) -> bool {
        if self.is_null() {
            *self = Self::Map(BTreeMap::new());
            true
        } else {
            false
        }
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl<T: Property + Default> Property for Option<T> {
    fn type_name(&self) -> &'static str {
        match self {
            Some(inner) => inner.type_name(),
            None => type_name::<T>(),
        }
    }

    fn node(&self) -> Node<'_> {
        match self {
            Some(inner) => inner.node(),
            None => Node::Null,
        }
    }

    fn node_mut(&mut self) -> NodeMut<'_> {
        match self {
            Some(inner) => inner.node_mut(),
            None => NodeMut::Null,
        }
    }

    fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
        if value.is_null() {
            *self = None;
            return Ok(());
        }
        match self {
            Some(inner) => inner.assign(value),
            None => {
                let mut inner = T::default();
                inner.assign(value)?;
                *self = Some(inner);
                Ok(())
            }
        }
    }

    fn instantiate(&mut self) -> bool {
        match self {
            Some(inner) => inner.instantiate(),
            None => {
                *self = Some(T::default());
                true
            }
        }
    }

    fn is_null(&self) -> bool {
        self.as_ref().is_none_or(Property::is_null)
    }
}

impl<T: Property + ?Sized> Property for Box<T> {
    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }

    fn node(&self) -> Node<'_> {
        (**self).node()
    }

    fn node_mut(&mut self) -> NodeMut<'_> {
        (**self).node_mut()
    }

    fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
        (**self).assign(value)
    }

    fn instantiate(&mut self) -> bool {
        (**self).instantiate()
    }

    fn is_null(&self) -> bool {
        (**self).is_null()
    }

    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: Property> PropertyList for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn item(&self, index: usize) -> Option<&dyn Property> {
        self.as_slice().get(index).map(|item| item as &dyn Property)
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Property> {
        self.as_mut_slice()
            .get_mut(index)
            .map(|item| item as &mut dyn Property)
    }
}

impl<T: Property + Default> Property for Vec<T> {
    fn type_name(&self) -> &'static str {
        type_name::<Self>()
    }

    fn node(&self) -> Node<'_> {
        Node::List(self)
    }

    fn node_mut(&mut self) -> NodeMut<'_> {
        NodeMut::List(self)
    }

    fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
        let Value::List(items) = value else {
            return Err(ReflectionError::mismatch("list", &value));
        };
        let mut converted = Vec::with_capacity(items.len());
        for item in items {
            let mut slot = T::default();
            slot.assign(item)?;
            converted.push(slot);
        }
        *self = converted;
        Ok(())
    }
}

macro_rules! impl_map_property {
    ($map:ident, $($bound:tt)*) => {
        impl<T: Property + Default, S: $($bound)*> PropertyMap for $map<String, T, S> {
            fn sorted_keys(&self) -> Vec<String> {
                let mut keys: Vec<String> = self.keys().cloned().collect();
                keys.sort_unstable();
                keys
            }

            fn len(&self) -> usize {
                $map::len(self)
            }

            fn lookup(&self, key: &str) -> Option<&dyn Property> {
                self.get(key).map(|v| v as &dyn Property)
            }

            fn lookup_mut(&mut self, key: &str) -> Option<&mut dyn Property> {
                self.get_mut(key).map(|v| v as &mut dyn Property)
            }

            fn entry_or_default(&mut self, key: &str) -> &mut dyn Property {
                self.entry(key.to_string()).or_default()
            }

            fn insert_value(&mut self, key: &str, value: Value) -> Result<(), ReflectionError> {
                let mut slot = T::default();
                slot.assign(value)?;
                self.insert(key.to_string(), slot);
                Ok(())
            }
        }

        impl<T: Property + Default, S: $($bound)*> Property for $map<String, T, S> {
            fn type_name(&self) -> &'static str {
                type_name::<Self>()
            }

            fn node(&self) -> Node<'_> {
                Node::Map(self)
            }

            fn node_mut(&mut self) -> NodeMut<'_> {
                NodeMut::Map(self)
            }

            fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
                let Value::Map(entries) = value else {
                    return Err(ReflectionError::mismatch("map", &value));
                };
                self.clear();
                for (key, entry) in entries {
                    let mut slot = T::default();
                    slot.assign(entry)?;
                    self.insert(key, slot);
                }
                Ok(())
            }
        }
    };
}

impl_map_property!(HashMap, std::hash::BuildHasher + Default + Send + Sync);

impl<T: Property + Default> PropertyMap for BTreeMap<String, T> {
    fn sorted_keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn lookup(&self, key: &str) -> Option<&dyn Property> {
        self.get(key).map(|v| v as &dyn Property)
    }

    fn lookup_mut(&mut self, key: &str) -> Option<&mut dyn Property> {
        self.get_mut(key).map(|v| v as &mut dyn Property)
    }

    fn entry_or_default(&mut self, key: &str) -> &mut dyn Property {
        self.entry(key.to_string()).or_default()
    }

    fn insert_value(&mut self, key: &str, value: Value) -> Result<(), ReflectionError> {
        let mut slot = T::default();
        slot.assign(value)?;
        self.insert(key.to_string(), slot);
        Ok(())
    }
}

impl<T: Property + Default> Property for BTreeMap<String, T> {
    fn type_name(&self) -> &'static str {
        type_name::<Self>()
    }

    fn node(&self) -> Node<'_> {
        Node::Map(self)
    }

    fn node_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Map(self)
    }

    fn assign(&mut self, value: Value) -> Result<(), ReflectionError> {
        let Value::Map(entries) = value else {
            return Err(ReflectionError::mismatch("map", &value));
        };
        self.clear();
        for (key, entry) in entries {
            let mut slot = T::default();
            slot.assign(entry)?;
            self.insert(key, slot);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_assign() {
        let mut age = 0i32;
        age.assign(Value::from(21)).unwrap();
        assert_eq!(age, 21);
        assert!(age.assign(Value::from("x")).is_err());
        assert!(matches!(age.node(), Node::Scalar(Value::Int(21))));
    }

    #[test]
    fn test_option_null_and_instantiate() {
        let mut name: Option<String> = Some("a".into());
        assert!(!name.is_null());
        name.assign(Value::Null).unwrap();
        assert!(name.is_null());

        assert!(name.instantiate());
        assert_eq!(name.as_deref(), Some(""));
    }

    #[test]
    fn test_vec_view() {
        let ids = vec![1i64, 2, 3];
        let Node::List(list) = ids.node() else {
            panic!("expected list");
        };
        assert_eq!(list.len(), 3);
        assert_eq!(list.item(1).unwrap().to_value(), Value::Int(2));
        assert!(list.item(3).is_none());
    }

    #[test]
    fn test_vec_assign() {
        let mut ids: Vec<u32> = Vec::new();
        ids.assign(Value::list([1, 2])).unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert!(ids.assign(Value::from(1)).is_err());
    }

    #[test]
    fn test_hashmap_snapshot_is_sorted() {
        let mut map = HashMap::new();
        for key in ["zeta", "alpha", "mid"] {
            map.insert(key.to_string(), key.len() as i32);
        }
        assert_eq!(map.to_value().to_string(), "{alpha=5, mid=3, zeta=4}");
    }

    #[test]
    fn test_map_entry_or_default() {
        let mut map: BTreeMap<String, Value> = BTreeMap::new();
        let entry = map.entry_or_default("nested");
        assert!(entry.is_null());
        assert!(entry.instantiate());
        assert_eq!(map["nested"], Value::Map(BTreeMap::new()));
    }

    #[test]
    fn test_value_instantiate() {
        let mut value = Value::Null;
        assert!(value.instantiate());
        assert!(!value.instantiate());
        assert!(matches!(value.node(), Node::Map(_)));
    }
}
