//! Scenes: entities, systems, and the per-type component cache.
//!
//! The cache answers [`Scene::get_components`] without walking entities.
//! Every attach/detach notification is applied to a per-type index under a
//! mutex, after which the whole cache is regenerated and swapped in, so a
//! reader always sees a complete snapshot and never a half-applied change.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

use crate::component::Component;
use crate::entity::{Entity, EntityId};
use crate::handle::{ComponentHandle, ComponentRef, SystemHandle, SystemRef};
use crate::sync::{lock, read, write};
use crate::system::System;
use crate::time::FrameTime;
use crate::type_key::TypeKey;

/// Immutable snapshot of every live component in a scene, grouped by type.
#[derive(Debug, Default)]
struct ComponentCache {
    version: u64,
    by_type: HashMap<TypeKey, Arc<[ComponentHandle]>>,
}

/// A collection of entities and systems.
pub struct Scene {
    name: String,
    this: Weak<Scene>,
    entities: RwLock<Vec<Arc<Entity>>>,
    systems: DashMap<TypeKey, SystemHandle>,
    index: Mutex<HashMap<TypeKey, Vec<ComponentHandle>>>,
    cache: RwLock<Arc<ComponentCache>>,
    frame_time: RwLock<FrameTime>,
}

impl Scene {
    pub const DEFAULT_NAME: &'static str = "Scene";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|this| Self {
            name,
            this: Weak::clone(this),
            entities: RwLock::new(Vec::new()),
            systems: DashMap::new(),
            index: Mutex::new(HashMap::new()),
            cache: RwLock::new(Arc::default()),
            frame_time: RwLock::new(FrameTime::default()),
        })
    }

    /// A scene with no entities and no systems.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Self::new(Self::DEFAULT_NAME)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add `entity` and cache all of its components.
    ///
    /// Returns `false` if the entity is already part of this scene or still
    /// belongs to another one.
    pub fn add_entity(&self, entity: &Arc<Entity>) -> bool {
        let mut index = lock(&self.index);
        {
            let mut entities = write(&self.entities);
            if entities.iter().any(|e| Arc::ptr_eq(e, entity)) {
                return false;
            }
            // Subscribe before taking the snapshot: anything attached after
            // this point is reported to us and deduplicated below.
            if !entity.subscribe(Weak::clone(&self.this)) {
                debug!(scene = %self.name, entity = %entity.id(), "entity owned by another scene");
                return false;
            }
            entities.push(Arc::clone(entity));
        }
        for handle in entity.components() {
            insert_handle(&mut index, handle);
        }
        self.rebuild(&index);
        debug!(scene = %self.name, entity = %entity.id(), "entity added");
        true
    }

    /// Remove `entity` and drop its components from the cache.
    ///
    /// Returns `false` if the entity is not part of this scene.
    pub fn remove_entity(&self, entity: &Arc<Entity>) -> bool {
        let mut index = lock(&self.index);
        {
            let mut entities = write(&self.entities);
            let before = entities.len();
            entities.retain(|e| !Arc::ptr_eq(e, entity));
            if entities.len() == before {
                return false;
            }
        }
        entity.unsubscribe(self);
        index.retain(|_, list| {
            list.retain(|handle| {
                !handle
                    .entity()
                    .is_some_and(|owner| Arc::ptr_eq(&owner, entity))
            });
            !list.is_empty()
        });
        self.rebuild(&index);
        debug!(scene = %self.name, entity = %entity.id(), "entity removed");
        true
    }

    /// A snapshot of the scene's entities, in insertion order.
    #[must_use]
    pub fn entities(&self) -> Vec<Arc<Entity>> {
        read(&self.entities).clone()
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        read(&self.entities).len()
    }

    #[must_use]
    pub fn find_entity(&self, id: EntityId) -> Option<Arc<Entity>> {
        read(&self.entities).iter().find(|e| e.id() == id).cloned()
    }

    /// Construct a `T` with [`Default`] and add it.
    ///
    /// Returns `None` if the scene already has a `T`.
    pub fn add_system<T: System + Default>(&self) -> Option<SystemRef<T>> {
        if self.systems.contains_key(&TypeKey::of::<T>()) {
            debug!(
                scene = %self.name,
                system = std::any::type_name::<T>(),
                "system already added"
            );
            return None;
        }
        self.add_system_with(T::default())
    }

    /// Add `system`, unless the scene already has one of the same type.
    ///
    /// The system's `on_enable` runs when the scene is loaded by an engine.
    pub fn add_system_with<T: System>(&self, system: T) -> Option<SystemRef<T>> {
        let handle = SystemHandle::system(Arc::new(system), Weak::clone(&self.this));
        match self.systems.entry(handle.key()) {
            Entry::Occupied(_) => {
                debug!(scene = %self.name, system = handle.type_name(), "system already added");
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                debug!(scene = %self.name, system = handle.type_name(), "system added");
                handle.downcast::<T>()
            }
        }
    }

    /// Remove the `T` system. Returns `false` if there was none.
    pub fn remove_system<T: System>(&self) -> bool {
        self.systems.remove(&TypeKey::of::<T>()).is_some()
    }

    #[must_use]
    pub fn get_system<T: System>(&self) -> Option<SystemRef<T>> {
        self.systems
            .get(&TypeKey::of::<T>())
            .and_then(|entry| entry.value().downcast::<T>())
    }

    /// A snapshot of every system in the scene.
    #[must_use]
    pub fn systems(&self) -> Vec<SystemHandle> {
        self.systems
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Every live `T` component across the scene's entities.
    ///
    /// Components marked for removal are still returned until the
    /// end-of-frame sweep detaches them.
    #[must_use]
    pub fn get_components<T: Component>(&self) -> Vec<ComponentRef<T>> {
        let cache = Arc::clone(&*read(&self.cache));
        cache
            .by_type
            .get(&TypeKey::of::<T>())
            .map(|list| list.iter().filter_map(|h| h.downcast::<T>()).collect())
            .unwrap_or_default()
    }

    /// Incremented every time the component cache is regenerated.
    #[must_use]
    pub fn cache_version(&self) -> u64 {
        read(&self.cache).version
    }

    /// Timing of the frame currently being run on this scene.
    #[must_use]
    pub fn frame_time(&self) -> FrameTime {
        *read(&self.frame_time)
    }

    pub(crate) fn set_frame_time(&self, time: FrameTime) {
        *write(&self.frame_time) = time;
    }

    pub(crate) fn component_added(&self, handle: &ComponentHandle) {
        let mut index = lock(&self.index);
        // The entity may have left the scene, or the component may already
        // be detached again, while this notification waited for the lock.
        let current = handle
            .entity()
            .is_some_and(|owner| owner.is_subscribed_to(self) && owner.is_live(handle));
        if !current || !insert_handle(&mut index, handle.clone()) {
            trace!(scene = %self.name, component = handle.type_name(), "stale add ignored");
            return;
        }
        self.rebuild(&index);
    }

    pub(crate) fn component_removed(&self, handle: &ComponentHandle) {
        let mut index = lock(&self.index);
        let Some(list) = index.get_mut(&handle.key()) else {
            return;
        };
        let before = list.len();
        list.retain(|cached| !cached.ptr_eq(handle));
        if list.len() == before {
            return;
        }
        if list.is_empty() {
            index.remove(&handle.key());
        }
        self.rebuild(&index);
    }

    /// Regenerate the cache from `index` and publish it.
    fn rebuild(&self, index: &HashMap<TypeKey, Vec<ComponentHandle>>) {
        let by_type: HashMap<_, Arc<[ComponentHandle]>> = index
            .iter()
            .map(|(key, list)| (*key, Arc::from(list.as_slice())))
            .collect();
        let mut cache = write(&self.cache);
        let version = cache.version + 1;
        *cache = Arc::new(ComponentCache { version, by_type });
        trace!(scene = %self.name, version, types = index.len(), "component cache rebuilt");
    }
}

/// Append `handle` unless that exact instance is already indexed.
fn insert_handle(
    index: &mut HashMap<TypeKey, Vec<ComponentHandle>>,
    handle: ComponentHandle,
) -> bool {
    let list = index.entry(handle.key()).or_default();
    if list.iter().any(|cached| cached.ptr_eq(&handle)) {
        return false;
    }
    list.push(handle);
    true
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("entities", &self.entity_count())
            .field("systems", &self.systems.len())
            .field("cache_version", &self.cache_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::system::SystemContext;
    use crate::transform::Transform;

    #[derive(Debug, Default)]
    struct Health;

    impl Component for Health {}

    #[derive(Debug, Default)]
    struct Physics;

    #[async_trait]
    impl System for Physics {
        async fn update(&self, _cx: &SystemContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_entity_caches_existing_components() {
        let scene = Scene::new("level");
        let entity = Entity::new("e");
        assert!(scene.add_entity(&entity));
        assert_eq!(scene.entity_count(), 1);
        assert_eq!(scene.get_components::<Transform>().len(), 1);
        assert!(scene.get_components::<Health>().is_empty());
        assert!(entity.scene().is_some_and(|s| Arc::ptr_eq(&s, &scene)));
    }

    #[test]
    fn test_add_entity_twice_is_rejected() {
        let scene = Scene::empty();
        let entity = Entity::new("e");
        assert!(scene.add_entity(&entity));
        assert!(!scene.add_entity(&entity));
        assert_eq!(scene.entity_count(), 1);
        assert_eq!(scene.get_components::<Transform>().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_tracks_attach_and_detach() {
        let scene = Scene::empty();
        let entity = Entity::new("e");
        scene.add_entity(&entity);

        let health = entity.add_component::<Health>().await.unwrap().unwrap();
        let cached = scene.get_components::<Health>();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].ptr_eq(&health));

        // Marked components stay visible until the sweep.
        entity.remove_component::<Health>();
        assert_eq!(scene.get_components::<Health>().len(), 1);
        entity.remove_all_marked_for_removal().await.unwrap();
        assert!(scene.get_components::<Health>().is_empty());

        entity.add_component::<Health>().await.unwrap();
        entity.remove_component_immediate::<Health>().await.unwrap();
        assert!(scene.get_components::<Health>().is_empty());
    }

    #[tokio::test]
    async fn test_remove_entity_unsubscribes() {
        let scene = Scene::empty();
        let entity = Entity::new("e");
        scene.add_entity(&entity);
        assert!(scene.remove_entity(&entity));
        assert!(!scene.remove_entity(&entity));
        assert!(scene.get_components::<Transform>().is_empty());
        assert!(entity.scene().is_none());

        entity.add_component::<Health>().await.unwrap();
        assert!(scene.get_components::<Health>().is_empty());
    }

    #[tokio::test]
    async fn test_entity_belongs_to_one_scene_at_a_time() {
        let first = Scene::new("first");
        let second = Scene::new("second");
        let entity = Entity::new("e");
        assert!(first.add_entity(&entity));
        assert!(!second.add_entity(&entity));
        assert_eq!(second.entity_count(), 0);

        // The owning scene keeps receiving notifications.
        entity.remove_component_immediate::<Transform>().await.unwrap();
        entity.add_component::<Health>().await.unwrap();
        assert!(first.get_components::<Transform>().is_empty());
        assert_eq!(first.get_components::<Health>().len(), 1);
        assert!(second.get_components::<Health>().is_empty());

        // Once released, the entity can move.
        assert!(first.remove_entity(&entity));
        assert!(second.add_entity(&entity));
        assert_eq!(second.get_components::<Health>().len(), 1);
        assert!(entity.scene().is_some_and(|s| Arc::ptr_eq(&s, &second)));
    }

    #[test]
    fn test_dropped_scene_releases_its_entities() {
        let entity = Entity::new("e");
        Scene::new("gone").add_entity(&entity);
        let next = Scene::new("next");
        assert!(next.add_entity(&entity));
        assert_eq!(next.get_components::<Transform>().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_cache_each_instance_once() {
        let scene = Scene::empty();
        let entities: Vec<_> = (0..64).map(|i| Entity::new(format!("e{i}"))).collect();
        for entity in &entities {
            scene.add_entity(entity);
        }

        let mut tasks = tokio::task::JoinSet::new();
        for entity in &entities {
            // Two racing adds per entity: exactly one may win.
            for _ in 0..2 {
                let entity = Arc::clone(entity);
                tasks.spawn(async move { entity.add_component::<Health>().await });
            }
        }
        let mut added = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap().is_some() {
                added += 1;
            }
        }

        assert_eq!(added, 64);
        let cached = scene.get_components::<Health>();
        assert_eq!(cached.len(), 64);
        for entity in &entities {
            let live = entity.get_component::<Health>().unwrap();
            assert_eq!(cached.iter().filter(|c| c.ptr_eq(&live)).count(), 1);
        }
    }

    #[test]
    fn test_cache_version_increments_per_rebuild() {
        let scene = Scene::empty();
        assert_eq!(scene.cache_version(), 0);
        let entity = Entity::new("e");
        scene.add_entity(&entity);
        assert_eq!(scene.cache_version(), 1);
        scene.remove_entity(&entity);
        assert_eq!(scene.cache_version(), 2);
    }

    #[test]
    fn test_systems_are_unique_per_type() {
        let scene = Scene::empty();
        let first = scene.add_system::<Physics>().unwrap();
        assert!(scene.add_system::<Physics>().is_none());
        assert!(scene.add_system_with(Physics).is_none());
        assert!(scene.get_system::<Physics>().unwrap().ptr_eq(&first));
        assert!(first.scene().is_some_and(|s| Arc::ptr_eq(&s, &scene)));
        assert_eq!(scene.system_count(), 1);

        assert!(scene.remove_system::<Physics>());
        assert!(!scene.remove_system::<Physics>());
        assert!(scene.get_system::<Physics>().is_none());
    }

    #[test]
    fn test_find_entity_by_id() {
        let scene = Scene::empty();
        let entity = Entity::new("needle");
        scene.add_entity(&entity);
        scene.add_entity(&Entity::new("hay"));
        let found = scene.find_entity(entity.id()).unwrap();
        assert_eq!(found.name(), "needle");
        assert!(scene.find_entity(EntityId::new()).is_none());
    }
}
