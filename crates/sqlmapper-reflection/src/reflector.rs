//! Per-type property metadata and the process-wide accessor cache.
//!
//! A [`Reflector`] is built once per host type from its static
//! [`ClassDescriptor`] and then shared. [`ReflectorFactory`] owns the cache:
//! concurrent first use of a type performs exactly one build, and every
//! caller receives the same `Arc`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;

use crate::error::ReflectionError;
use crate::property::Property;
use crate::value::Value;

/// Type-erased read accessor for one field.
pub type Getter = for<'a> fn(&'a (dyn Any + 'static)) -> Option<&'a dyn Property>;

/// Type-erased write accessor for one field.
pub type GetterMut = for<'a> fn(&'a mut (dyn Any + 'static)) -> Option<&'a mut dyn Property>;

/// Static description of one property.
#[derive(Clone, Copy)]
pub struct PropertyDescriptor {
    /// Canonical property name.
    pub name: &'static str,
    /// Declared type, as written in the source.
    pub type_name: &'static str,
    /// Read accessor, if the property is readable.
    pub get: Option<Getter>,
    /// Write accessor, if the property is writable.
    pub get_mut: Option<GetterMut>,
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("readable", &self.get.is_some())
            .field("writable", &self.get_mut.is_some())
            .finish()
    }
}

/// Static description of a host type, usually generated by `#[derive(Reflect)]`.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Host type name.
    pub type_name: &'static str,
    /// Properties in declaration order.
    pub properties: Vec<PropertyDescriptor>,
}

/// A host type whose named properties can be read and written by name.
///
/// Implement it with `#[derive(Reflect)]`.
pub trait Reflect: Property + Any {
    /// Describe the properties of this type.
    fn descriptor() -> ClassDescriptor
    where
        Self: Sized;

    /// Cached metadata for this type.
    fn reflector(&self) -> Arc<Reflector>;

    /// Upcast for accessor dispatch.
    fn as_any(&self) -> &(dyn Any + 'static);

    /// Mutable upcast for accessor dispatch.
    fn as_any_mut(&mut self) -> &mut (dyn Any + 'static);

    /// View this object as a plain property.
    fn as_property(&self) -> &dyn Property;

    /// View this object as a plain mutable property.
    fn as_property_mut(&mut self) -> &mut dyn Property;
}

/// Cached property metadata for one host type.
pub struct Reflector {
    type_name: &'static str,
    readable: Vec<&'static str>,
    writable: Vec<&'static str>,
    properties: HashMap<&'static str, PropertyDescriptor>,
    case_insensitive: HashMap<String, &'static str>,
}

impl Reflector {
    /// Build the metadata for a type from its descriptor.
    ///
    /// When two properties share a name the first one wins.
    #[must_use]
    pub fn new(descriptor: ClassDescriptor) -> Self {
        let mut readable = Vec::new();
        let mut writable = Vec::new();
        let mut properties = HashMap::with_capacity(descriptor.properties.len());
        let mut case_insensitive = HashMap::with_capacity(descriptor.properties.len());

        for property in descriptor.properties {
            if properties.contains_key(property.name) {
                continue;
            }
            if property.get.is_some() {
                readable.push(property.name);
            }
            if property.get_mut.is_some() {
                writable.push(property.name);
            }
            case_insensitive
                .entry(property.name.to_uppercase())
                .or_insert(property.name);
            properties.insert(property.name, property);
        }

        Self {
            type_name: descriptor.type_name,
            readable,
            writable,
            properties,
            case_insensitive,
        }
    }

    /// Host type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Readable property names in declaration order.
    #[must_use]
    pub fn readable_properties(&self) -> &[&'static str] {
        &self.readable
    }

    /// Writable property names in declaration order.
    #[must_use]
    pub fn writable_properties(&self) -> &[&'static str] {
        &self.writable
    }

    /// Resolve a property name to its canonical spelling.
    ///
    /// An exact match wins; otherwise the lookup ignores case.
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<&'static str> {
        if let Some((canonical, _)) = self.properties.get_key_value(name) {
            return Some(*canonical);
        }
        self.case_insensitive.get(&name.to_uppercase()).copied()
    }

    /// Check for a readable property.
    #[must_use]
    pub fn has_getter(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(|p| p.get.is_some())
    }

    /// Check for a writable property.
    #[must_use]
    pub fn has_setter(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(|p| p.get_mut.is_some())
    }

    /// Declared type of a property.
    #[must_use]
    pub fn property_type(&self, name: &str) -> Option<&'static str> {
        self.descriptor(name).map(|p| p.type_name)
    }

    fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.find_property(name)
            .and_then(|canonical| self.properties.get(canonical))
    }

    /// Borrow a property of `target`.
    pub fn get<'o>(
        &self,
        target: &'o dyn Reflect,
        name: &str,
    ) -> Result<&'o dyn Property, ReflectionError> {
        self.descriptor(name)
            .and_then(|p| p.get)
            .and_then(|get| get(target.as_any()))
            .ok_or_else(|| self.no_getter(name))
    }

    /// Mutably borrow a property of `target`.
    pub fn get_mut<'o>(
        &self,
        target: &'o mut dyn Reflect,
        name: &str,
    ) -> Result<&'o mut dyn Property, ReflectionError> {
        let Some(get_mut) = self.descriptor(name).and_then(|p| p.get_mut) else {
            return Err(self.no_setter(name));
        };
        get_mut(target.as_any_mut()).ok_or_else(|| self.no_setter(name))
    }

    /// Assign a property of `target` from a dynamic value.
    pub fn set(
        &self,
        target: &mut dyn Reflect,
        name: &str,
        value: Value,
    ) -> Result<(), ReflectionError> {
        self.get_mut(target, name)?.assign(value)
    }

    /// Snapshot every readable property into a map value.
    #[must_use]
    pub fn snapshot(&self, target: &dyn Reflect) -> Value {
        self.readable
            .iter()
            .filter_map(|name| {
                let value = self.get(target, name).ok()?.to_value();
                Some(((*name).to_string(), value))
            })
            .collect()
    }

    fn no_getter(&self, name: &str) -> ReflectionError {
        ReflectionError::NoGetter {
            property: self.find_property(name).unwrap_or(name).to_string(),
            type_name: self.type_name,
        }
    }

    fn no_setter(&self, name: &str) -> ReflectionError {
        ReflectionError::NoSetter {
            property: self.find_property(name).unwrap_or(name).to_string(),
            type_name: self.type_name,
        }
    }
}

impl fmt::Debug for Reflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflector")
            .field("type_name", &self.type_name)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

/// Assign a reflected object from a map value, property by property.
///
/// Used by derived `Property::assign` implementations. Keys resolve like
/// any other property name, so case is ignored.
pub fn assign_object(target: &mut dyn Reflect, value: Value) -> Result<(), ReflectionError> {
    let Value::Map(entries) = value else {
        return Err(ReflectionError::TypeMismatch {
            expected: target.type_name(),
            actual: value.type_name().to_string(),
        });
    };
    let reflector = target.reflector();
    for (name, entry) in entries {
        reflector.set(target, &name, entry)?;
    }
    Ok(())
}

type Slot = Arc<OnceCell<Arc<Reflector>>>;

static GLOBAL: Lazy<ReflectorFactory> = Lazy::new(ReflectorFactory::new);

/// Cache of reflectors keyed by type identity.
///
/// Entries are never evicted. The lock only guards slot creation; the build
/// itself runs inside the slot's `OnceCell`, so concurrent first use of a
/// type blocks on a single build instead of racing.
#[derive(Default)]
pub struct ReflectorFactory {
    cache: RwLock<HashMap<TypeId, Slot>>,
    builds: AtomicUsize,
}

impl ReflectorFactory {
    /// Create an empty, independent cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by derived `Reflect` implementations.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Find or build the reflector for `T`.
    pub fn find_for<T: Reflect>(&self) -> Arc<Reflector> {
        self.find_or_build(TypeId::of::<T>(), T::descriptor)
    }

    /// Find the reflector for a type, building it with `describe` on first use.
    pub fn find_or_build(
        &self,
        type_id: TypeId,
        describe: impl FnOnce() -> ClassDescriptor,
    ) -> Arc<Reflector> {
        let existing = self.cache.read().get(&type_id).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => Arc::clone(self.cache.write().entry(type_id).or_default()),
        };

        Arc::clone(slot.get_or_init(|| {
            let descriptor = describe();
            self.builds.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                type_name = descriptor.type_name,
                properties = descriptor.properties.len(),
                "building reflector"
            );
            Arc::new(Reflector::new(descriptor))
        }))
    }

    /// Number of reflectors built by this cache.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check for an empty cache.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ReflectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectorFactory")
            .field("types", &self.len())
            .field("builds", &self.builds())
            .finish()
    }
}
