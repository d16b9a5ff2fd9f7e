//! Generational entity storage.
//!
//! Agents and structures live in one slot arena. Handles carry the slot
//! generation, so a handle kept after its entity died never resolves to
//! whatever later reuses the slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::components::{Agent, Structure};

/// Generation-checked handle to an entity.
///
/// Ordering is by slot index first; the simulation processes entities in
/// that order and lower handles win same-tick ties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Deterministic per-entity hash used for spreading jitter and bias.
    #[must_use]
    pub const fn mix(self) -> u32 {
        let mut h = self.index.wrapping_mul(0x9E37_79B1) ^ self.generation.wrapping_mul(0x85EB_CA6B);
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        h
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Anything that lives in the arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    /// A mobile agent.
    Agent(Agent),
    /// A static structure.
    Structure(Structure),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Storage for all entities in the simulation.
///
/// Iteration always walks slots in index order, which keeps every system
/// deterministic without sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityStorage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity and return its handle.
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            return EntityId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entity: Some(entity),
        });
        EntityId {
            index,
            generation: 0,
        }
    }

    /// Remove an entity. Stale handles return `None`.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(entity)
    }

    /// Get an entity by handle.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.entity.as_ref()
        } else {
            None
        }
    }

    /// Get a mutable reference to an entity by handle.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.entity.as_mut()
        } else {
            None
        }
    }

    /// Check if a handle is live.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Get the number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if storage is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live handles in processing order.
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Iterate live entities in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entity.as_ref().map(|e| {
                (
                    EntityId {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    e,
                )
            })
        })
    }

    /// Iterate agents in processing order.
    pub fn agents(&self) -> impl Iterator<Item = (EntityId, &Agent)> {
        self.iter().filter_map(|(id, e)| match e {
            Entity::Agent(a) => Some((id, a)),
            Entity::Structure(_) => None,
        })
    }

    /// Iterate structures in processing order.
    pub fn structures(&self) -> impl Iterator<Item = (EntityId, &Structure)> {
        self.iter().filter_map(|(id, e)| match e {
            Entity::Structure(s) => Some((id, s)),
            Entity::Agent(_) => None,
        })
    }

    /// Handles of all live agents in processing order.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<EntityId> {
        self.agents().map(|(id, _)| id).collect()
    }

    /// Look up an agent.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        match self.get(id)? {
            Entity::Agent(a) => Some(a),
            Entity::Structure(_) => None,
        }
    }

    /// Look up an agent mutably.
    pub fn agent_mut(&mut self, id: EntityId) -> Option<&mut Agent> {
        match self.get_mut(id)? {
            Entity::Agent(a) => Some(a),
            Entity::Structure(_) => None,
        }
    }

    /// Look up a structure.
    #[must_use]
    pub fn structure(&self, id: EntityId) -> Option<&Structure> {
        match self.get(id)? {
            Entity::Structure(s) => Some(s),
            Entity::Agent(_) => None,
        }
    }

    /// Look up a structure mutably.
    pub fn structure_mut(&mut self, id: EntityId) -> Option<&mut Structure> {
        match self.get_mut(id)? {
            Entity::Structure(s) => Some(s),
            Entity::Agent(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentClass, Structure};
    use crate::grid::Tile;
    use crate::math::Vec2Fixed;

    fn structure() -> Entity {
        Entity::Structure(Structure::new(1, Tile::new(0, 0), 2, 2, 100))
    }

    fn agent() -> Entity {
        Entity::Agent(Agent::new(AgentClass::Vehicle, 1, Vec2Fixed::ZERO))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut storage = EntityStorage::new();
        let a = storage.insert(agent());
        let s = storage.insert(structure());
        assert_eq!(storage.len(), 2);
        assert!(storage.agent(a).is_some());
        assert!(storage.structure(a).is_none());
        assert!(storage.structure(s).is_some());
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut storage = EntityStorage::new();
        let first = storage.insert(agent());
        assert!(storage.remove(first).is_some());
        let second = storage.insert(structure());

        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(storage.get(first).is_none());
        assert!(storage.remove(first).is_none());
        assert!(storage.structure(second).is_some());
    }

    #[test]
    fn test_iteration_in_index_order() {
        let mut storage = EntityStorage::new();
        let ids: Vec<_> = (0..5).map(|_| storage.insert(agent())).collect();
        storage.remove(ids[2]);
        let walked = storage.ids();
        assert_eq!(walked, vec![ids[0], ids[1], ids[3], ids[4]]);
        assert!(walked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_mix_is_stable() {
        let mut storage = EntityStorage::new();
        let id = storage.insert(agent());
        assert_eq!(id.mix(), id.mix());
    }
}
