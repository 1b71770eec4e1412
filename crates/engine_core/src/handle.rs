//! Owned, back-referenced instances.
//!
//! Components belong to exactly one [`Entity`] and systems to exactly one
//! [`Scene`]. The owner back-reference is stamped once, when the instance is
//! created, and never reassigned. [`Attached`] is the typed view handed to
//! callers; [`Handle`] is the type-erased form stored in per-type maps.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crate::component::Component;
use crate::entity::Entity;
use crate::scene::Scene;
use crate::system::System;
use crate::type_key::TypeKey;

/// A shared instance together with a weak reference to its owner.
pub struct Attached<T: ?Sized, O> {
    value: Arc<T>,
    owner: Weak<O>,
}

/// A typed component attached to an [`Entity`].
pub type ComponentRef<T> = Attached<T, Entity>;

/// A typed system attached to a [`Scene`].
pub type SystemRef<T> = Attached<T, Scene>;

impl<T: ?Sized, O> Attached<T, O> {
    pub(crate) fn new(value: Arc<T>, owner: Weak<O>) -> Self {
        Self { value, owner }
    }

    /// The owner, if it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Arc<O>> {
        self.owner.upgrade()
    }

    /// The shared instance.
    #[must_use]
    pub fn as_arc(&self) -> &Arc<T> {
        &self.value
    }

    /// Returns `true` if both refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl<T: ?Sized> Attached<T, Entity> {
    /// The entity this component is attached to.
    #[must_use]
    pub fn entity(&self) -> Option<Arc<Entity>> {
        self.owner()
    }
}

impl<T: ?Sized> Attached<T, Scene> {
    /// The scene this system belongs to.
    #[must_use]
    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.owner()
    }
}

impl<T: ?Sized, O> Clone for Attached<T, O> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            owner: Weak::clone(&self.owner),
        }
    }
}

impl<T: ?Sized, O> Deref for Attached<T, O> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized + fmt::Debug, O> fmt::Debug for Attached<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attached")
            .field("value", &self.value)
            .field("owner_alive", &(self.owner.strong_count() > 0))
            .finish()
    }
}

/// A type-erased instance stored under its [`TypeKey`].
///
/// Keeps two views of the same allocation: the trait object used for hook
/// dispatch and an `Any` view used to recover the concrete type.
pub struct Handle<D: ?Sized, O> {
    key: TypeKey,
    type_name: &'static str,
    erased: Attached<D, O>,
    any: Arc<dyn Any + Send + Sync>,
}

/// A type-erased component attached to an [`Entity`].
pub type ComponentHandle = Handle<dyn Component, Entity>;

/// A type-erased system attached to a [`Scene`].
pub type SystemHandle = Handle<dyn System, Scene>;

impl<D: ?Sized, O> Handle<D, O> {
    /// The key of the concrete type.
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// The fully qualified name of the concrete type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The trait object.
    #[must_use]
    pub fn get(&self) -> &Arc<D> {
        self.erased.as_arc()
    }

    /// The owner, if it is still alive.
    #[must_use]
    pub fn owner(&self) -> Option<Arc<O>> {
        self.erased.owner()
    }

    /// Recover the typed view, if the concrete type is `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Attached<T, O>> {
        Arc::clone(&self.any)
            .downcast::<T>()
            .ok()
            .map(|value| Attached::new(value, Weak::clone(&self.erased.owner)))
    }

    /// Returns `true` if both refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }
}

impl ComponentHandle {
    /// Wrap a freshly created component, stamping its owning entity.
    pub(crate) fn component<T: Component>(value: Arc<T>, owner: Weak<Entity>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            type_name: std::any::type_name::<T>(),
            any: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
            erased: Attached::new(value as Arc<dyn Component>, owner),
        }
    }

    /// The entity this component is attached to.
    #[must_use]
    pub fn entity(&self) -> Option<Arc<Entity>> {
        self.owner()
    }
}

impl SystemHandle {
    /// Wrap a freshly created system, stamping its owning scene.
    pub(crate) fn system<T: System>(value: Arc<T>, owner: Weak<Scene>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            type_name: std::any::type_name::<T>(),
            any: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
            erased: Attached::new(value as Arc<dyn System>, owner),
        }
    }

    /// The scene this system belongs to.
    #[must_use]
    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.owner()
    }
}

impl<D: ?Sized, O> Clone for Handle<D, O> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            type_name: self.type_name,
            erased: self.erased.clone(),
            any: Arc::clone(&self.any),
        }
    }
}

impl<D: ?Sized, O> fmt::Debug for Handle<D, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", &self.key)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}
