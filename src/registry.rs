//! Class metadata consulted by the lifecycle controller.
//!
//! The registry is an injected, read-only lookup service. It is assembled once
//! with [`RegistryBuilder`] and shared behind an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::{EngineResult, ObjectRef, ScriptEngine};
use crate::error::{BridgeError, BridgeResult};

/// Class identifier in its internal `/`-separated form.
///
/// Host code names classes with dots (`com.example.Point`); the registry keys
/// on slashes (`com/example/Point`). Either form is accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassName(String);

impl ClassName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().replace('.', "/"))
    }

    /// Internal form, `/`-separated.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host-facing form, `.`-separated.
    pub fn canonical(&self) -> String {
        self.0.replace('/', ".")
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for ClassName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How an entity's script-side lifetime relates to its host-side lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectKind {
    /// One script object per entity, linked through its internal slot and
    /// governed by the weak/strong protocol.
    #[default]
    Ordinary,
    /// Host and script lifetimes are decoupled; any number of script objects
    /// may reference the entity over time.
    Wrapper,
}

/// Produces a fresh script-side object for an entity of this class.
pub type Constructor<E> = Arc<dyn Fn(&mut E) -> EngineResult<ObjectRef> + Send + Sync>;

pub struct ClassInfo<E> {
    pub name: ClassName,
    pub kind: ObjectKind,
    pub constructor: Constructor<E>,
}

impl<E> Clone for ClassInfo<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            constructor: self.constructor.clone(),
        }
    }
}

impl<E> fmt::Debug for ClassInfo<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Read-only class lookup.
pub trait ClassRegistry<E>: Send + Sync {
    fn class_info(&self, name: &ClassName) -> Option<&ClassInfo<E>>;

    /// Class used to wrap script objects handed to the host without an entity.
    fn generic_class(&self) -> Option<&ClassName>;

    fn require(&self, name: &ClassName) -> BridgeResult<&ClassInfo<E>> {
        self.class_info(name)
            .ok_or_else(|| BridgeError::UnknownClass(name.canonical()))
    }
}

/// Immutable registry produced by [`RegistryBuilder::build`].
pub struct StaticRegistry<E> {
    classes: HashMap<ClassName, ClassInfo<E>>,
    generic: Option<ClassName>,
}

impl<E> StaticRegistry<E> {
    pub fn builder() -> RegistryBuilder<E> {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl<E> ClassRegistry<E> for StaticRegistry<E> {
    fn class_info(&self, name: &ClassName) -> Option<&ClassInfo<E>> {
        self.classes.get(name)
    }

    fn generic_class(&self) -> Option<&ClassName> {
        self.generic.as_ref()
    }
}

pub struct RegistryBuilder<E> {
    classes: HashMap<ClassName, ClassInfo<E>>,
    generic: Option<ClassName>,
}

impl<E> Default for RegistryBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RegistryBuilder<E> {
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            generic: None,
        }
    }

    /// Register a class with its own constructor.
    pub fn register<F>(mut self, name: impl AsRef<str>, kind: ObjectKind, constructor: F) -> Self
    where
        F: Fn(&mut E) -> EngineResult<ObjectRef> + Send + Sync + 'static,
    {
        let name = ClassName::new(name);
        log::trace!("Registered class {} ({:?})", name, kind);

        self.classes.insert(
            name.clone(),
            ClassInfo {
                name,
                kind,
                constructor: Arc::new(constructor),
            },
        );
        self
    }

    /// Register `derived` as a subclass of an already registered `base`.
    ///
    /// The subclass shares the base's kind and constructor. Both names may be
    /// given in either separator form.
    pub fn register_subclass(mut self, derived: impl AsRef<str>, base: impl AsRef<str>) -> BridgeResult<Self> {
        let derived = ClassName::new(derived);
        let base = ClassName::new(base);

        let Some(parent) = self.classes.get(&base) else {
            return Err(BridgeError::UnknownClass(base.canonical()));
        };

        let info = ClassInfo {
            name: derived.clone(),
            kind: parent.kind,
            constructor: parent.constructor.clone(),
        };
        log::trace!("Registered class {} extending {}", derived, base);

        self.classes.insert(derived, info);
        Ok(self)
    }

    /// Designate the class used to wrap unlinked script objects.
    pub fn generic(mut self, name: impl AsRef<str>) -> Self {
        self.generic = Some(ClassName::new(name));
        self
    }

    pub fn build(self) -> BridgeResult<StaticRegistry<E>> {
        if let Some(generic) = &self.generic
            && !self.classes.contains_key(generic)
        {
            return Err(BridgeError::UnknownClass(generic.canonical()));
        }

        Ok(StaticRegistry {
            classes: self.classes,
            generic: self.generic,
        })
    }
}

/// Constructor producing a plain object, suitable for generic classes.
pub fn plain_object<E: ScriptEngine>(engine: &mut E) -> EngineResult<ObjectRef> {
    Ok(engine.new_object())
}
