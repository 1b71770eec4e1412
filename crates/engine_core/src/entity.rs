//! Entities and the components they own.
//!
//! An [`Entity`] is an identity plus a type-keyed set of components, at most
//! one per concrete component type. Removal comes in two flavours:
//!
//! - [`Entity::remove_component`] only *marks* the component. It stays live,
//!   and visible to anything iterating the entity during the current frame,
//!   until the engine sweeps marks with
//!   [`Entity::remove_all_marked_for_removal`] after the last phase.
//! - [`Entity::remove_component_immediate`] detaches it right away.
//!
//! While an entity belongs to a [`Scene`], every attach and detach is
//! reported to that scene so its component cache stays current.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::component::{Component, ComponentContext};
use crate::error::EngineError;
use crate::handle::{ComponentHandle, ComponentRef};
use crate::scene::Scene;
use crate::sync::{read, write};
use crate::time::FrameTime;
use crate::transform::Transform;
use crate::type_key::TypeKey;

/// A unique entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// An identity owning at most one component per concrete type.
pub struct Entity {
    id: EntityId,
    name: RwLock<String>,
    components: DashMap<TypeKey, ComponentHandle>,
    marked_for_removal: DashMap<TypeKey, ComponentHandle>,
    /// Scene receiving this entity's attach/detach notifications.
    scene: RwLock<Weak<Scene>>,
}

impl Entity {
    /// Create an entity with the given display name and a default
    /// [`Transform`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let entity = Arc::new(Self {
            id: EntityId::new(),
            name: RwLock::new(name.into()),
            components: DashMap::new(),
            marked_for_removal: DashMap::new(),
            scene: RwLock::new(Weak::new()),
        });
        // Transform has no enable hook, so there is nothing to await here.
        entity.insert(Transform::default());
        entity
    }

    /// Unique identifier assigned at creation.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> String {
        read(&self.name).clone()
    }

    /// Rename the entity.
    pub fn set_name(&self, name: impl Into<String>) {
        *write(&self.name) = name.into();
    }

    /// The scene this entity currently belongs to.
    #[must_use]
    pub fn scene(&self) -> Option<Arc<Scene>> {
        read(&self.scene).upgrade()
    }

    /// Construct a `T` with [`Default`] and attach it.
    ///
    /// Returns `Ok(None)` without constructing anything if a `T` is already
    /// attached. See [`Entity::attach`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Hook`] if the component's `on_enable` fails.
    pub async fn add_component<T: Component + Default>(
        self: &Arc<Self>,
    ) -> Result<Option<ComponentRef<T>>, EngineError> {
        if self.components.contains_key(&TypeKey::of::<T>()) {
            debug!(
                entity = %self.id,
                component = std::any::type_name::<T>(),
                "component already attached"
            );
            return Ok(None);
        }
        self.attach(T::default()).await
    }

    /// Attach `component`, notify the owning scene, then await its
    /// `on_enable` hook.
    ///
    /// Returns `Ok(None)` and drops `component` if a component of the same
    /// type is already attached; the existing instance is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Hook`] if `on_enable` fails. The component
    /// stays attached in that case.
    pub async fn attach<T: Component>(
        self: &Arc<Self>,
        component: T,
    ) -> Result<Option<ComponentRef<T>>, EngineError> {
        let Some(handle) = self.insert(component) else {
            debug!(
                entity = %self.id,
                component = std::any::type_name::<T>(),
                "component already attached"
            );
            return Ok(None);
        };
        if let Some(scene) = self.scene() {
            scene.component_added(&handle);
        }
        trace!(entity = %self.id, component = handle.type_name(), "component attached");

        let cx = ComponentContext::new(Arc::clone(self), self.frame_time());
        handle
            .get()
            .on_enable(&cx)
            .await
            .map_err(|err| EngineError::hook("on_enable", handle.type_name(), err))?;
        Ok(handle.downcast::<T>())
    }

    /// Mark the `T` component for removal at the end of the frame.
    ///
    /// The component stays live and `on_disable` is not called until
    /// [`Entity::remove_all_marked_for_removal`] runs. Returns `false` if no
    /// `T` is attached.
    pub fn remove_component<T: Component>(&self) -> bool {
        let key = TypeKey::of::<T>();
        let Some(handle) = self.live(key) else {
            return false;
        };
        self.marked_for_removal.insert(key, handle);
        true
    }

    /// Detach the `T` component now: await `on_disable`, notify the scene,
    /// and drop it from the entity. Any pending mark for `T` is cleared.
    ///
    /// Returns `Ok(false)` if no `T` was attached.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Hook`] if `on_disable` fails. The component is
    /// detached regardless.
    pub async fn remove_component_immediate<T: Component>(
        self: &Arc<Self>,
    ) -> Result<bool, EngineError> {
        let key = TypeKey::of::<T>();
        self.marked_for_removal.remove(&key);
        let Some(handle) = self.live(key) else {
            return Ok(false);
        };
        self.detach(handle).await?;
        Ok(true)
    }

    /// Detach every marked component that is still attached, then clear the
    /// marks. Returns how many components were detached.
    ///
    /// Marks placed while the sweep is running are kept for the next sweep.
    ///
    /// # Errors
    ///
    /// Returns the first [`EngineError::Hook`] raised by an `on_disable`
    /// hook. Every marked component is detached regardless.
    pub async fn remove_all_marked_for_removal(self: &Arc<Self>) -> Result<usize, EngineError> {
        let keys: Vec<TypeKey> = self
            .marked_for_removal
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        let mut first_error = None;
        for key in keys {
            let Some((_, marked)) = self.marked_for_removal.remove(&key) else {
                continue;
            };
            let Some(live) = self.live(key) else {
                continue;
            };
            if !live.ptr_eq(&marked) {
                continue;
            }
            removed += 1;
            if let Err(err) = self.detach(live).await {
                warn!(entity = %self.id, error = %err, "component failed to disable");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// The attached `T` component, if any.
    #[must_use]
    pub fn get_component<T: Component>(&self) -> Option<ComponentRef<T>> {
        self.live(TypeKey::of::<T>())?.downcast::<T>()
    }

    /// Whether a `T` is attached, marked for removal or not.
    #[must_use]
    pub fn has_component<T: Component>(&self) -> bool {
        self.components.contains_key(&TypeKey::of::<T>())
    }

    /// Whether the `T` component is waiting for the end-of-frame sweep.
    #[must_use]
    pub fn is_marked_for_removal<T: Component>(&self) -> bool {
        self.marked_for_removal.contains_key(&TypeKey::of::<T>())
    }

    /// Number of attached components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// A snapshot of every attached component.
    #[must_use]
    pub fn components(&self) -> Vec<ComponentHandle> {
        self.components
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Route future attach/detach notifications to `scene`.
    pub(crate) fn subscribe(&self, scene: Weak<Scene>) -> bool {
        let mut current = write(&self.scene);
        if current.strong_count() > 0 && !Weak::ptr_eq(&current, &scene) {
            return false;
        }
        *current = scene;
        true
    }

    /// Stop notifying `scene`, if it is the current subscriber.
    pub(crate) fn unsubscribe(&self, scene: &Scene) {
        let mut current = write(&self.scene);
        if std::ptr::eq(current.as_ptr(), scene) {
            *current = Weak::new();
        }
    }

    /// Whether `handle` is the instance currently attached for its type.
    pub(crate) fn is_live(&self, handle: &ComponentHandle) -> bool {
        self.components
            .get(&handle.key())
            .is_some_and(|entry| entry.value().ptr_eq(handle))
    }

    /// Whether notifications currently go to `scene`.
    pub(crate) fn is_subscribed_to(&self, scene: &Scene) -> bool {
        std::ptr::eq(read(&self.scene).as_ptr(), scene)
    }

    fn live(&self, key: TypeKey) -> Option<ComponentHandle> {
        self.components.get(&key).map(|entry| entry.value().clone())
    }

    fn insert<T: Component>(self: &Arc<Self>, component: T) -> Option<ComponentHandle> {
        let handle = ComponentHandle::component(Arc::new(component), Arc::downgrade(self));
        match self.components.entry(handle.key()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                Some(handle)
            }
        }
    }

    async fn detach(self: &Arc<Self>, handle: ComponentHandle) -> Result<(), EngineError> {
        let cx = ComponentContext::new(Arc::clone(self), self.frame_time());
        let disabled = handle.get().on_disable(&cx).await;
        // Leave the live map before notifying so the scene never re-caches it.
        self.components
            .remove_if(&handle.key(), |_, live| live.ptr_eq(&handle));
        if let Some(scene) = self.scene() {
            scene.component_removed(&handle);
        }
        trace!(entity = %self.id, component = handle.type_name(), "component detached");
        disabled.map_err(|err| EngineError::hook("on_disable", handle.type_name(), err))
    }

    fn frame_time(&self) -> FrameTime {
        self.scene()
            .map(|scene| scene.frame_time())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &*read(&self.name))
            .field("components", &self.components.len())
            .field("marked_for_removal", &self.marked_for_removal.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Default)]
    struct Probe {
        enabled: AtomicUsize,
        disabled: AtomicUsize,
    }

    #[async_trait]
    impl Component for Probe {
        async fn on_enable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_disable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            self.disabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct BrokenEnable;

    #[async_trait]
    impl Component for BrokenEnable {
        async fn on_enable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            anyhow::bail!("device lost")
        }
    }

    #[derive(Debug, Default)]
    struct BrokenDisable;

    #[async_trait]
    impl Component for BrokenDisable {
        async fn on_disable(&self, _cx: &ComponentContext) -> anyhow::Result<()> {
            anyhow::bail!("still in use")
        }
    }

    #[test]
    fn test_new_entity_has_transform() {
        let entity = Entity::new("player");
        assert_eq!(entity.name(), "player");
        assert!(entity.has_component::<Transform>());
        assert_eq!(entity.component_count(), 1);
        assert!(entity.scene().is_none());
    }

    #[test]
    fn test_entity_ids_are_unique() {
        assert_ne!(Entity::new("a").id(), Entity::new("b").id());
    }

    #[tokio::test]
    async fn test_add_component_runs_on_enable_and_stamps_owner() {
        let entity = Entity::new("e");
        let probe = entity.add_component::<Probe>().await.unwrap().unwrap();
        assert_eq!(probe.enabled.load(Ordering::SeqCst), 1);
        assert_eq!(probe.entity().unwrap().id(), entity.id());
    }

    #[tokio::test]
    async fn test_second_add_returns_none_and_keeps_original() {
        let entity = Entity::new("e");
        let first = entity.add_component::<Probe>().await.unwrap().unwrap();
        assert!(entity.add_component::<Probe>().await.unwrap().is_none());
        assert!(entity.attach(Probe::default()).await.unwrap().is_none());

        let current = entity.get_component::<Probe>().unwrap();
        assert!(current.ptr_eq(&first));
        assert_eq!(first.enabled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_component_is_deferred_until_sweep() {
        let entity = Entity::new("e");
        let probe = entity.add_component::<Probe>().await.unwrap().unwrap();

        assert!(entity.remove_component::<Probe>());
        assert!(entity.is_marked_for_removal::<Probe>());
        assert!(entity.get_component::<Probe>().is_some());
        assert_eq!(probe.disabled.load(Ordering::SeqCst), 0);

        assert_eq!(entity.remove_all_marked_for_removal().await.unwrap(), 1);
        assert!(entity.get_component::<Probe>().is_none());
        assert!(!entity.is_marked_for_removal::<Probe>());
        assert_eq!(probe.disabled.load(Ordering::SeqCst), 1);

        // A second sweep has nothing left to do.
        assert_eq!(entity.remove_all_marked_for_removal().await.unwrap(), 0);
        assert_eq!(probe.disabled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_removal_disables_once_and_clears_mark() {
        let entity = Entity::new("e");
        let probe = entity.add_component::<Probe>().await.unwrap().unwrap();
        assert!(entity.remove_component::<Probe>());

        assert!(entity.remove_component_immediate::<Probe>().await.unwrap());
        assert!(entity.get_component::<Probe>().is_none());
        assert!(!entity.is_marked_for_removal::<Probe>());
        assert_eq!(probe.disabled.load(Ordering::SeqCst), 1);

        assert_eq!(entity.remove_all_marked_for_removal().await.unwrap(), 0);
        assert_eq!(probe.disabled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_removing_absent_component_is_noop() {
        let entity = Entity::new("e");
        assert!(!entity.remove_component::<Probe>());
        assert!(!entity.remove_component_immediate::<Probe>().await.unwrap());
    }

    #[tokio::test]
    async fn test_readd_after_sweep_creates_new_instance() {
        let entity = Entity::new("e");
        let first = entity.add_component::<Probe>().await.unwrap().unwrap();
        entity.remove_component::<Probe>();
        entity.remove_all_marked_for_removal().await.unwrap();

        let second = entity.add_component::<Probe>().await.unwrap().unwrap();
        assert!(!second.ptr_eq(&first));
    }

    #[tokio::test]
    async fn test_failed_on_enable_keeps_component_attached() {
        let entity = Entity::new("e");
        let err = entity.add_component::<BrokenEnable>().await.unwrap_err();
        assert!(matches!(err, EngineError::Hook { hook: "on_enable", .. }));
        assert!(entity.has_component::<BrokenEnable>());
    }

    #[tokio::test]
    async fn test_failed_on_disable_still_detaches() {
        let entity = Entity::new("e");
        entity.add_component::<BrokenDisable>().await.unwrap();
        entity.add_component::<Probe>().await.unwrap();
        entity.remove_component::<BrokenDisable>();
        entity.remove_component::<Probe>();

        let err = entity.remove_all_marked_for_removal().await.unwrap_err();
        assert!(matches!(err, EngineError::Hook { hook: "on_disable", .. }));
        assert!(!entity.has_component::<BrokenDisable>());
        assert!(!entity.has_component::<Probe>());
        assert_eq!(entity.component_count(), 1);
    }
}
