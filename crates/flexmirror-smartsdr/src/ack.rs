//! Cross-entity ack dependencies.
//!
//! An entity is Acked once its own required fields have been observed
//! ([`Entity::own_fields_ready`]) and its references to other entities are
//! satisfied:
//!
//! | Kind       | Dependency                                              |
//! |------------|---------------------------------------------------------|
//! | Slice      | `pan` is 0, or that panadapter is Acked                 |
//! | Panadapter | `waterfall` is 0, or that waterfall is Acked            |
//! | Waterfall  | the parent panadapter is registered                     |
//!
//! Resolution walks a worklist: when something becomes Acked, the
//! entities that depend on it are evaluated again. Because
//! [`EntityRegistry::mark_acked`] only reports the first transition, running
//! the resolver any number of times never acks an entity twice.

use std::collections::VecDeque;

use flexmirror_core::{EntityKey, EntityKind};

use crate::entity::{Entity, EntityFields};
use crate::registry::EntityRegistry;

#[derive(Debug, Clone, Copy, Default)]
pub struct AckDependencyResolver;

impl AckDependencyResolver {
    /// Re-evaluate `start` after it changed, cascading to its dependents.
    ///
    /// `created` is true when `start` was just inserted into the registry,
    /// which lets entities waiting for it to exist be evaluated again.
    /// Returns the keys that became Acked, in transition order.
    pub fn resolve(registry: &mut EntityRegistry, start: EntityKey, created: bool) -> Vec<EntityKey> {
        let mut worklist = VecDeque::from([start]);
        if created && start.kind == EntityKind::Panadapter {
            worklist.extend(registry.keys_where(EntityKind::Waterfall, |wf| {
                matches!(wf.fields(), EntityFields::Waterfall(f) if f.panadapter == Some(start.id))
            }));
        }

        let mut acked = Vec::new();
        while let Some(key) = worklist.pop_front() {
            if !Self::is_ready(registry, &key) {
                continue;
            }
            if registry.mark_acked(&key) {
                tracing::debug!(entity = %key, "Entity acked");
                acked.push(key);
                worklist.extend(Self::dependents(registry, key));
            }
        }
        acked
    }

    /// Whether `key` satisfies both its own and its cross-entity conditions.
    pub fn is_ready(registry: &EntityRegistry, key: &EntityKey) -> bool {
        let Some(entity) = registry.get(key) else {
            return false;
        };
        if !entity.own_fields_ready() {
            return false;
        }

        match entity.fields() {
            EntityFields::Slice(f) => {
                f.pan == 0 || registry.is_acked(&EntityKey::new(EntityKind::Panadapter, f.pan))
            }
            EntityFields::Panadapter(f) => match f.waterfall {
                Some(0) => true,
                Some(id) => registry.is_acked(&EntityKey::new(EntityKind::Waterfall, id)),
                None => false,
            },
            EntityFields::Waterfall(f) => f
                .panadapter
                .is_some_and(|id| registry.contains(&EntityKey::new(EntityKind::Panadapter, id))),
            _ => true,
        }
    }

    /// Entities whose readiness may change now that `key` is Acked.
    fn dependents(registry: &EntityRegistry, key: EntityKey) -> Vec<EntityKey> {
        match key.kind {
            EntityKind::Waterfall => registry
                .get(&key)
                .and_then(|wf| match wf.fields() {
                    EntityFields::Waterfall(f) => f.panadapter,
                    _ => None,
                })
                .map(|pan| vec![EntityKey::new(EntityKind::Panadapter, pan)])
                .unwrap_or_default(),
            EntityKind::Panadapter => registry.keys_where(EntityKind::Slice, |slice: &Entity| {
                matches!(slice.fields(), EntityFields::Slice(f) if f.pan == key.id)
            }),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAN: u32 = 0x4000_0000;
    const WF: u32 = 0x4200_0000;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Apply a status to `key` the way the mirror does and resolve.
    fn status(reg: &mut EntityRegistry, key: EntityKey, items: &[(&str, &str)]) -> Vec<EntityKey> {
        let (entity, created) = reg.lookup_or_create(key);
        entity.apply_status(&pairs(items));
        AckDependencyResolver::resolve(reg, key, created)
    }

    fn pan() -> EntityKey {
        EntityKey::new(EntityKind::Panadapter, PAN)
    }

    fn wf() -> EntityKey {
        EntityKey::new(EntityKind::Waterfall, WF)
    }

    fn slice(id: u32) -> EntityKey {
        EntityKey::new(EntityKind::Slice, id)
    }

    #[test]
    fn slice_without_pan_acks_on_in_use() {
        let mut reg = EntityRegistry::new();
        assert!(status(&mut reg, slice(0), &[("mode", "USB")]).is_empty());
        assert_eq!(
            status(&mut reg, slice(0), &[("in_use", "1"), ("pan", "0x0")]),
            vec![slice(0)]
        );
        // Re-broadcast does not ack again.
        assert!(status(&mut reg, slice(0), &[("in_use", "1")]).is_empty());
    }

    #[test]
    fn panadapter_waits_for_waterfall_then_cascades_to_slice() {
        let mut reg = EntityRegistry::new();

        assert!(status(&mut reg, slice(0), &[("in_use", "1"), ("pan", "0x40000000")]).is_empty());
        assert!(status(&mut reg, pan(), &[("waterfall", "0x42000000")]).is_empty());

        let acked = status(&mut reg, wf(), &[("panadapter", "0x40000000")]);
        assert_eq!(acked, vec![wf(), pan(), slice(0)]);
    }

    #[test]
    fn waterfall_before_panadapter() {
        let mut reg = EntityRegistry::new();
        assert!(status(&mut reg, wf(), &[("panadapter", "40000000")]).is_empty());

        let acked = status(&mut reg, pan(), &[("waterfall", "42000000")]);
        assert_eq!(acked, vec![wf(), pan()]);
    }

    #[test]
    fn panadapter_without_waterfall() {
        let mut reg = EntityRegistry::new();
        assert_eq!(
            status(&mut reg, pan(), &[("waterfall", "0x00000000")]),
            vec![pan()]
        );
    }

    #[test]
    fn tnf_needs_all_three_fields() {
        let mut reg = EntityRegistry::new();
        let tnf = EntityKey::new(EntityKind::Tnf, 1);
        assert!(status(&mut reg, tnf, &[("freq", "14.1"), ("depth", "1")]).is_empty());
        assert_eq!(status(&mut reg, tnf, &[("width", "0.0001")]), vec![tnf]);
    }

    #[test]
    fn memory_acks_on_first_status() {
        let mut reg = EntityRegistry::new();
        let mem = EntityKey::new(EntityKind::Memory, 3);
        assert_eq!(status(&mut reg, mem, &[]), vec![mem]);
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut reg = EntityRegistry::new();
        status(&mut reg, pan(), &[("waterfall", "0")]);
        for _ in 0..3 {
            assert!(AckDependencyResolver::resolve(&mut reg, pan(), false).is_empty());
        }
    }

    #[test]
    fn missing_entity_is_not_ready() {
        let reg = EntityRegistry::new();
        assert!(!AckDependencyResolver::is_ready(&reg, &slice(0)));
    }
}
