//! The authoritative map of mirrored entities.
//!
//! Keyed by [`EntityKey`] (kind plus radio-assigned id), so slice 0 and
//! memory 0 never collide. The registry itself is not synchronized; the
//! mirror guards it with a single mutex shared by the reply path and the
//! status path.

use std::collections::HashMap;

use flexmirror_core::{AckState, EntityKey, EntityKind};

use crate::entity::Entity;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityKey, Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the entity for `key`, creating it in the Identified state if
    /// this is the first time it has been referenced.
    ///
    /// Entities created here were first seen in a broadcast and are not
    /// owned by this client. Returns the entity and whether it was created.
    pub fn lookup_or_create(&mut self, key: EntityKey) -> (&mut Entity, bool) {
        let mut created = false;
        let entity = self.entities.entry(key).or_insert_with(|| {
            created = true;
            tracing::debug!(entity = %key, "Entity identified from status");
            Entity::new(key, AckState::Identified, false)
        });
        (entity, created)
    }

    /// Register an entity whose id arrived in a reply to our own creation
    /// request. If a broadcast already created it, adopt it as owned and
    /// keep its fields. Returns `true` if the entity was newly inserted.
    pub fn identify(&mut self, key: EntityKey) -> bool {
        match self.entities.get_mut(&key) {
            Some(existing) => {
                existing.set_owned();
                tracing::debug!(entity = %key, "Adopted broadcast entity as owned");
                false
            }
            None => {
                self.entities
                    .insert(key, Entity::new(key, AckState::Identified, true));
                tracing::debug!(entity = %key, "Entity identified from reply");
                true
            }
        }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn get_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Whether `key` is registered and Acked.
    pub fn is_acked(&self, key: &EntityKey) -> bool {
        self.entities.get(key).is_some_and(Entity::is_acked)
    }

    /// Advance `key` to Acked. Returns `true` only on the transition, so
    /// the caller can fire its one-shot notification.
    pub fn mark_acked(&mut self, key: &EntityKey) -> bool {
        match self.entities.get_mut(key) {
            Some(entity) => entity.set_ack(AckState::Acked),
            None => false,
        }
    }

    /// Evict `key`, returning the entity in the Removed state.
    pub fn remove(&mut self, key: &EntityKey) -> Option<Entity> {
        let mut entity = self.entities.remove(key)?;
        entity.set_ack(AckState::Removed);
        tracing::debug!(entity = %key, "Entity removed");
        Some(entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Keys of every entity of `kind` matching `predicate`.
    pub fn keys_where<F>(&self, kind: EntityKind, mut predicate: F) -> Vec<EntityKey>
    where
        F: FnMut(&Entity) -> bool,
    {
        let mut keys: Vec<EntityKey> = self
            .entities
            .values()
            .filter(|e| e.kind() == kind && predicate(e))
            .map(Entity::key)
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop every entity, returning their keys.
    pub fn clear(&mut self) -> Vec<EntityKey> {
        let mut keys: Vec<EntityKey> = self.entities.drain().map(|(k, _)| k).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(id: u32) -> EntityKey {
        EntityKey::new(EntityKind::Slice, id)
    }

    #[test]
    fn lookup_or_create_creates_once() {
        let mut reg = EntityRegistry::new();
        let (entity, created) = reg.lookup_or_create(slice(0));
        assert!(created);
        assert_eq!(entity.ack_state(), AckState::Identified);
        assert!(!entity.is_owned());

        let (_, created) = reg.lookup_or_create(slice(0));
        assert!(!created);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ids_are_scoped_by_kind() {
        let mut reg = EntityRegistry::new();
        reg.lookup_or_create(slice(0));
        reg.lookup_or_create(EntityKey::new(EntityKind::Memory, 0));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn identify_inserts_owned_or_adopts() {
        let mut reg = EntityRegistry::new();
        assert!(reg.identify(slice(1)));
        assert!(reg.get(&slice(1)).unwrap().is_owned());

        reg.lookup_or_create(slice(2));
        reg.get_mut(&slice(2))
            .unwrap()
            .apply_status(&[("mode".into(), "CW".into())]);
        assert!(!reg.identify(slice(2)));

        let adopted = reg.get(&slice(2)).unwrap();
        assert!(adopted.is_owned());
        match adopted.fields() {
            crate::entity::EntityFields::Slice(f) => assert_eq!(f.mode, "CW"),
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn mark_acked_fires_once() {
        let mut reg = EntityRegistry::new();
        reg.lookup_or_create(slice(0));
        assert!(reg.mark_acked(&slice(0)));
        assert!(!reg.mark_acked(&slice(0)));
        assert!(reg.is_acked(&slice(0)));
        assert!(!reg.mark_acked(&slice(9)));
    }

    #[test]
    fn remove_evicts() {
        let mut reg = EntityRegistry::new();
        reg.lookup_or_create(slice(0));
        let removed = reg.remove(&slice(0)).unwrap();
        assert_eq!(removed.ack_state(), AckState::Removed);
        assert!(!reg.contains(&slice(0)));
        assert!(reg.remove(&slice(0)).is_none());
    }

    #[test]
    fn keys_where_filters_by_kind() {
        let mut reg = EntityRegistry::new();
        for id in [2, 0, 1] {
            reg.lookup_or_create(slice(id));
        }
        reg.lookup_or_create(EntityKey::new(EntityKind::Tnf, 0));
        assert_eq!(
            reg.keys_where(EntityKind::Slice, |_| true),
            vec![slice(0), slice(1), slice(2)]
        );
        assert_eq!(reg.clear().len(), 4);
        assert!(reg.is_empty());
    }
}
