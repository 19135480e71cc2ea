//! Path-based reads and writes over arbitrary host values.

use crate::error::ReflectionError;
use crate::path::{PropertyPath, Segment, list_index};
use crate::property::{NULL, Node, NodeMut, Property};
use crate::value::Value;

/// Resolve one path segment below `owner`.
///
/// A null owner yields null, a missing map key yields null. Unknown struct
/// properties, out-of-range list indexes and indexing into scalars fail.
pub fn child<'o>(
    owner: &'o dyn Property,
    segment: Segment<'_>,
) -> Result<&'o dyn Property, ReflectionError> {
    match (owner.node(), segment) {
        (Node::Null, _) => Ok(&NULL),
        (Node::Object(object), segment) => object.reflector().get(object, segment.key()),
        (Node::Map(map), segment) => Ok(map.lookup(segment.key()).unwrap_or(&NULL)),
        (Node::List(list), Segment::Index(key)) => {
            let index = list_index(key)?;
            list.item(index)
                .ok_or_else(|| ReflectionError::IndexOutOfBounds {
                    path: format!("[{key}]"),
                    index,
                    len: list.len(),
                })
        }
        (Node::List(_) | Node::Scalar(_), Segment::Property(name)) => {
            Err(ReflectionError::NoGetter {
                property: name.to_string(),
                type_name: owner.type_name(),
            })
        }
        (Node::Scalar(_), Segment::Index(key)) => Err(ReflectionError::NotIndexable {
            segment: format!("[{key}]"),
            type_name: owner.type_name(),
        }),
    }
}

fn null_intermediate(path: &PropertyPath<'_>, index: usize) -> ReflectionError {
    let segment = match index {
        0 => "<root>".to_string(),
        i => path.prefix(i - 1).to_string(),
    };
    ReflectionError::NullIntermediate {
        path: path.as_str().to_string(),
        segment,
    }
}

fn with_path(err: ReflectionError, path: &PropertyPath<'_>) -> ReflectionError {
    match err {
        ReflectionError::IndexOutOfBounds { index, len, .. } => {
            ReflectionError::IndexOutOfBounds {
                path: path.as_str().to_string(),
                index,
                len,
            }
        }
        other => other,
    }
}

/// Read-only path navigation over a root value.
///
/// ```
/// use sqlmapper_reflection::{MetaObject, Property, Value};
///
/// let params = Value::map([("user", Value::map([("name", "alice")]))]);
/// let meta = MetaObject::new(&params);
/// assert_eq!(meta.get_value("user.name")?.to_value(), Value::from("alice"));
/// assert!(meta.get_value("user.missing")?.is_null());
/// # Ok::<(), sqlmapper_reflection::ReflectionError>(())
/// ```
#[derive(Clone, Copy)]
pub struct MetaObject<'o> {
    root: &'o dyn Property,
}

impl<'o> MetaObject<'o> {
    /// Wrap a root value.
    #[must_use]
    pub fn new(root: &'o dyn Property) -> Self {
        Self { root }
    }

    /// The wrapped root value.
    #[must_use]
    pub fn root(&self) -> &'o dyn Property {
        self.root
    }

    /// Resolve a property path.
    ///
    /// A null in the middle of the path is an error; a null at the end is
    /// returned as a null property.
    pub fn get_value(&self, path: &str) -> Result<&'o dyn Property, ReflectionError> {
        let parsed = PropertyPath::parse(path)?;
        let mut current = self.root;
        for (i, segment) in parsed.segments().enumerate() {
            if i > 0 && current.is_null() {
                return Err(null_intermediate(&parsed, i));
            }
            current = child(current, segment).map_err(|e| with_path(e, &parsed))?;
        }
        Ok(current)
    }

    /// Check whether a path resolves to a readable property.
    #[must_use]
    pub fn has_getter(&self, path: &str) -> bool {
        self.get_value(path).is_ok()
    }

    /// Readable property names of the root.
    ///
    /// Objects list their properties in declaration order, maps their keys
    /// in sorted order; anything else has none.
    #[must_use]
    pub fn getter_names(&self) -> Vec<String> {
        match self.root.node() {
            Node::Object(object) => object
                .reflector()
                .readable_properties()
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            Node::Map(map) => map.sorted_keys(),
            _ => Vec::new(),
        }
    }

    /// Resolve a dotted path to the canonical spelling of each struct
    /// property, ignoring case. With `camel_case` underscores in the
    /// requested names are ignored too, so `USER_NAME` finds `userName`.
    ///
    /// Map keys and indexes are kept as written. Returns `None` when a
    /// struct property does not exist.
    #[must_use]
    pub fn find_property(&self, path: &str, camel_case: bool) -> Option<String> {
        let parsed = PropertyPath::parse(path).ok()?;
        let mut current = self.root;
        let mut resolved = String::with_capacity(path.len());

        for segment in parsed.segments() {
            match segment {
                Segment::Property(name) => {
                    let canonical = match current.node() {
                        Node::Object(object) => {
                            let reflector = object.reflector();
                            let wanted = if camel_case {
                                name.replace('_', "")
                            } else {
                                name.to_string()
                            };
                            reflector.find_property(&wanted)?.to_string()
                        }
                        _ => name.to_string(),
                    };
                    if !resolved.is_empty() {
                        resolved.push('.');
                    }
                    resolved.push_str(&canonical);
                    current = child(current, Segment::Property(&canonical)).unwrap_or(&NULL);
                }
                Segment::Index(key) => {
                    resolved.push('[');
                    resolved.push_str(key);
                    resolved.push(']');
                    current = child(current, segment).unwrap_or(&NULL);
                }
            }
        }
        Some(resolved)
    }
}

/// Read-write path navigation over a root value.
pub struct MetaObjectMut<'o> {
    root: &'o mut dyn Property,
    auto_instantiate: bool,
}

impl<'o> MetaObjectMut<'o> {
    /// Wrap a root value. Null intermediates are instantiated by default.
    #[must_use]
    pub fn new(root: &'o mut dyn Property) -> Self {
        Self {
            root,
            auto_instantiate: true,
        }
    }

    /// Set whether null intermediates are instantiated while writing.
    #[must_use]
    pub fn auto_instantiate(mut self, enabled: bool) -> Self {
        self.auto_instantiate = enabled;
        self
    }

    /// Read-only view of the same root.
    #[must_use]
    pub fn as_meta_object(&self) -> MetaObject<'_> {
        MetaObject::new(&*self.root)
    }

    /// Resolve a property path for reading.
    pub fn get_value(&self, path: &str) -> Result<&dyn Property, ReflectionError> {
        MetaObject::new(&*self.root).get_value(path)
    }

    /// Assign the property at `path`.
    ///
    /// Missing map entries along the way are inserted. Null intermediates are
    /// instantiated when auto-instantiation is on and the type supports it;
    /// otherwise the write fails. Writing null through a null intermediate
    /// does nothing.
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), ReflectionError> {
        let parsed = PropertyPath::parse(path)?;
        let last = parsed.len() - 1;
        let auto = self.auto_instantiate;
        let mut current: &mut dyn Property = &mut *self.root;

        for (i, segment) in parsed.segments().enumerate() {
            if current.is_null() {
                if value.is_null() {
                    return Ok(());
                }
                if !(auto && current.instantiate()) {
                    return Err(null_intermediate(&parsed, i));
                }
            }

            if i == last {
                return assign_child(current, segment, value).map_err(|e| with_path(e, &parsed));
            }

            current = match child_mut(current, segment, auto, value.is_null()) {
                Ok(Some(next)) => next,
                Ok(None) => return Ok(()),
                Err(ReflectionError::NullIntermediate { .. }) => {
                    return Err(null_intermediate(&parsed, i + 1));
                }
                Err(e) => return Err(with_path(e, &parsed)),
            };
        }
        Ok(())
    }

    /// Check whether a path could be written.
    #[must_use]
    pub fn has_setter(&self, path: &str) -> bool {
        let Ok(parsed) = PropertyPath::parse(path) else {
            return false;
        };
        let last = parsed.len() - 1;
        let mut current: &dyn Property = &*self.root;

        for (i, segment) in parsed.segments().enumerate() {
            if i == last {
                return match (current.node(), segment) {
                    (Node::Object(object), segment) => {
                        object.reflector().has_setter(segment.key())
                    }
                    (Node::Map(_), _) => true,
                    (Node::List(list), Segment::Index(key)) => {
                        list_index(key).is_ok_and(|index| index < list.len())
                    }
                    _ => false,
                };
            }
            match child(current, segment) {
                // A null intermediate hides the static type below it.
                Ok(next) if next.is_null() => return self.auto_instantiate,
                Ok(next) => current = next,
                Err(_) => return false,
            }
        }
        false
    }
}

// Descend one segment for writing. `Ok(None)` means the write is a no-op.
fn child_mut<'o>(
    owner: &'o mut dyn Property,
    segment: Segment<'_>,
    auto_instantiate: bool,
    writing_null: bool,
) -> Result<Option<&'o mut dyn Property>, ReflectionError> {
    let type_name = owner.type_name();
    match (owner.node_mut(), segment) {
        (NodeMut::Object(object), segment) => {
            let reflector = object.reflector();
            reflector.get_mut(object, segment.key()).map(Some)
        }
        (NodeMut::Map(map), segment) => {
            let key = segment.key();
            if map.lookup(key).is_none() {
                if writing_null {
                    return Ok(None);
                }
                if !auto_instantiate {
                    return Err(ReflectionError::NullIntermediate {
                        path: key.to_string(),
                        segment: key.to_string(),
                    });
                }
            }
            Ok(Some(map.entry_or_default(key)))
        }
        (NodeMut::List(list), Segment::Index(key)) => {
            let index = list_index(key)?;
            let len = list.len();
            list.item_mut(index)
                .map(Some)
                .ok_or_else(|| ReflectionError::IndexOutOfBounds {
                    path: format!("[{key}]"),
                    index,
                    len,
                })
        }
        (NodeMut::Null, _) => Err(ReflectionError::NullIntermediate {
            path: segment.key().to_string(),
            segment: segment.key().to_string(),
        }),
        (NodeMut::List(_) | NodeMut::Scalar, Segment::Property(name)) => {
            Err(ReflectionError::NoSetter {
                property: name.to_string(),
                type_name,
            })
        }
        (NodeMut::Scalar, Segment::Index(key)) => Err(ReflectionError::NotIndexable {
            segment: format!("[{key}]"),
            type_name,
        }),
    }
}

// Assign the final segment below `owner`.
fn assign_child(
    owner: &mut dyn Property,
    segment: Segment<'_>,
    value: Value,
) -> Result<(), ReflectionError> {
    let type_name = owner.type_name();
    match (owner.node_mut(), segment) {
        (NodeMut::Object(object), segment) => {
            let reflector = object.reflector();
            reflector.set(object, segment.key(), value)
        }
        (NodeMut::Map(map), segment) => match map.lookup_mut(segment.key()) {
            Some(entry) => entry.assign(value),
            None => map.insert_value(segment.key(), value),
        },
        (NodeMut::List(list), Segment::Index(key)) => {
            let index = list_index(key)?;
            let len = list.len();
            match list.item_mut(index) {
                Some(item) => item.assign(value),
                None => Err(ReflectionError::IndexOutOfBounds {
                    path: format!("[{key}]"),
                    index,
                    len,
                }),
            }
        }
        (NodeMut::Scalar, Segment::Index(key)) => Err(ReflectionError::NotIndexable {
            segment: format!("[{key}]"),
            type_name,
        }),
        (_, segment) => Err(ReflectionError::NoSetter {
            property: segment.key().to_string(),
            type_name,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    fn sample() -> Value {
        Value::map([
            ("name", Value::from("alice")),
            ("ids", Value::list([1, 2, 3])),
            ("address", Value::map([("city", "Oslo")])),
            ("nothing", Value::Null),
        ])
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let params = sample();
        let meta = MetaObject::new(&params);
        assert_eq!(meta.get_value("address.city").unwrap().to_value(), Value::from("Oslo"));
        assert_eq!(meta.get_value("ids[1]").unwrap().to_value(), Value::Int(2));
        assert_eq!(
            meta.get_value("address['city']").unwrap().to_value(),
            Value::from("Oslo")
        );
    }

    #[test]
    fn test_missing_map_key_is_null() {
        let params = sample();
        let meta = MetaObject::new(&params);
        assert!(meta.get_value("unknown").unwrap().is_null());
        assert!(meta.get_value("address.zip").unwrap().is_null());
    }

    #[test]
    fn test_null_intermediate_fails() {
        let params = sample();
        let err = MetaObject::new(&params)
            .get_value("nothing.deeper")
            .err()
            .unwrap();
        assert_eq!(
            err,
            ReflectionError::NullIntermediate {
                path: "nothing.deeper".into(),
                segment: "nothing".into()
            }
        );
    }

    #[test]
    fn test_index_out_of_bounds_reports_path() {
        let params = sample();
        let err = MetaObject::new(&params).get_value("ids[5]").err().unwrap();
        assert_eq!(
            err,
            ReflectionError::IndexOutOfBounds {
                path: "ids[5]".into(),
                index: 5,
                len: 3
            }
        );
    }

    #[test]
    fn test_scalar_is_not_indexable() {
        let params = sample();
        let err = MetaObject::new(&params).get_value("name[0]").err().unwrap();
        assert!(matches!(err, ReflectionError::NotIndexable { .. }));
    }

    #[test]
    fn test_set_creates_map_intermediates() {
        let mut params = Value::Null;
        let mut meta = MetaObjectMut::new(&mut params);
        meta.set_value("order.customer.name", Value::from("bob"))
            .unwrap();
        assert_eq!(params.to_string(), "{order={customer={name=bob}}}");
    }

    #[test]
    fn test_set_without_auto_instantiate() {
        let mut params = Value::map([("order", Value::Null)]);
        let err = MetaObjectMut::new(&mut params)
            .auto_instantiate(false)
            .set_value("order.id", Value::from(1))
            .unwrap_err();
        assert_eq!(
            err,
            ReflectionError::NullIntermediate {
                path: "order.id".into(),
                segment: "order".into()
            }
        );
    }

    #[test]
    fn test_set_null_through_null_is_noop() {
        let mut params = Value::map([("order", Value::Null)]);
        MetaObjectMut::new(&mut params)
            .set_value("order.id", Value::Null)
            .unwrap();
        assert_eq!(params, Value::map([("order", Value::Null)]));

        MetaObjectMut::new(&mut params)
            .set_value("missing.id", Value::Null)
            .unwrap();
        assert_eq!(params, Value::map([("order", Value::Null)]));
    }

    #[test]
    fn test_set_list_item() {
        let mut ids = vec![1i32, 2, 3];
        let mut meta = MetaObjectMut::new(&mut ids);
        meta.set_value("[1]", Value::from(20)).unwrap();
        assert!(meta.set_value("[3]", Value::from(1)).is_err());
        assert_eq!(ids, vec![1, 20, 3]);
    }

    #[test]
    fn test_set_typed_map() {
        let mut scores: HashMap<String, Option<i64>> = HashMap::new();
        let mut meta = MetaObjectMut::new(&mut scores);
        meta.set_value("alice", Value::from(3)).unwrap();
        meta.set_value("bob", Value::Null).unwrap();
        assert!(meta.set_value("carol", Value::from("x")).is_err());
        assert!(meta.has_setter("anyone"));
        assert_eq!(scores.get("alice"), Some(&Some(3)));
        assert_eq!(scores.get("bob"), Some(&None));
    }

    #[test]
    fn test_nested_typed_maps() {
        let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        MetaObjectMut::new(&mut groups)
            .set_value("admins.lead", Value::from("eve"))
            .unwrap();
        assert_eq!(groups["admins"]["lead"], "eve");
    }

    #[test]
    fn test_getter_names() {
        let params = sample();
        assert_eq!(
            MetaObject::new(&params).getter_names(),
            vec!["address", "ids", "name", "nothing"]
        );
    }
}
