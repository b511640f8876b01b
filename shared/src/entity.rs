//! `EntityManager`: a generation-bumped freelist arena over entity indices, mirroring the
//! two-parallel-arenas (entity index, physics index) design used to avoid owning-pointer cycles
//! between a rigid body and the entity that owns it.

use crate::constants::{MAX_ENTITIES, MAX_PLAYERS};

pub const WORLD_ENTITY_INDEX: usize = 0;
pub const FIRST_PLAYER_ENTITY_INDEX: usize = 1;
pub const FIRST_FREE_ENTITY_INDEX: usize = 1 + MAX_PLAYERS;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: (f32, f32, f32),
    pub orientation: (f32, f32, f32, f32),
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            position: (0.0, 0.0, 0.0),
            orientation: (0.0, 0.0, 0.0, 1.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: (f32, f32, f32),
    pub angular: (f32, f32, f32),
}

/// The entity kind set is closed at two variants plus the world, so a tagged enum is enough —
/// no trait object or dynamic dispatch is needed for "Entity -> CubeEntity" inheritance.
#[derive(Clone, Copy, Debug)]
pub enum EntityKind {
    World,
    Player,
    Cube { scale: f32 },
}

#[derive(Clone, Copy, Debug)]
pub struct Entity {
    pub entity_index: usize,
    pub physics_index: Option<usize>,
    pub owner: usize,
    pub pose: Pose,
    pub velocity: Velocity,
    pub kind: EntityKind,
    pub generation: u32,
}

pub struct EntityManager {
    slots: Vec<Option<Entity>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl EntityManager {
    pub fn new() -> Self {
        let mut slots = vec![None; MAX_ENTITIES];
        let generations = vec![0u32; MAX_ENTITIES];

        slots[WORLD_ENTITY_INDEX] = Some(Entity {
            entity_index: WORLD_ENTITY_INDEX,
            physics_index: None,
            owner: 0,
            pose: Pose::default(),
            velocity: Velocity::default(),
            kind: EntityKind::World,
            generation: 0,
        });

        for player in 0..MAX_PLAYERS {
            let index = FIRST_PLAYER_ENTITY_INDEX + player;
            slots[index] = Some(Entity {
                entity_index: index,
                physics_index: None,
                owner: player + 1,
                pose: Pose::default(),
                velocity: Velocity::default(),
                kind: EntityKind::Player,
                generation: 0,
            });
        }

        let free_list = (FIRST_FREE_ENTITY_INDEX..MAX_ENTITIES).rev().collect();

        EntityManager {
            slots,
            generations,
            free_list,
        }
    }

    pub fn allocate_cube(&mut self, scale: f32) -> Option<usize> {
        let index = self.free_list.pop()?;
        self.generations[index] += 1;
        self.slots[index] = Some(Entity {
            entity_index: index,
            physics_index: None,
            owner: 0,
            pose: Pose::default(),
            velocity: Velocity::default(),
            kind: EntityKind::Cube { scale },
            generation: self.generations[index],
        });
        Some(index)
    }

    pub fn free(&mut self, index: usize) {
        assert!(
            index >= FIRST_FREE_ENTITY_INDEX,
            "world and player entity slots are never freed"
        );
        if self.slots[index].take().is_some() {
            self.free_list.push(index);
        }
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.slots.get_mut(index).and_then(|s| s.as_mut())
    }

    pub fn generation(&self, index: usize) -> u32 {
        self.generations[index]
    }

    pub fn live_count(&self) -> usize {
        MAX_ENTITIES - self.free_list.len()
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_and_player_slots_are_preallocated() {
        let manager = EntityManager::new();
        assert!(matches!(
            manager.get(WORLD_ENTITY_INDEX).unwrap().kind,
            EntityKind::World
        ));
        for player in 0..MAX_PLAYERS {
            let entity = manager.get(FIRST_PLAYER_ENTITY_INDEX + player).unwrap();
            assert!(matches!(entity.kind, EntityKind::Player));
            assert_eq!(entity.owner, player + 1);
        }
    }

    #[test]
    fn allocate_and_free_round_trips_through_freelist() {
        let mut manager = EntityManager::new();
        let a = manager.allocate_cube(1.0).unwrap();
        let b = manager.allocate_cube(1.0).unwrap();
        assert_ne!(a, b);
        manager.free(a);
        let c = manager.allocate_cube(1.0).unwrap();
        assert_eq!(a, c, "freed index should be reused");
        assert!(manager.generation(c) > manager.generation(b));
    }

    #[test]
    #[should_panic]
    fn freeing_a_player_slot_panics() {
        let mut manager = EntityManager::new();
        manager.free(FIRST_PLAYER_ENTITY_INDEX);
    }

    #[test]
    fn allocation_exhausts_at_max_entities() {
        let mut manager = EntityManager::new();
        let mut allocated = Vec::new();
        while let Some(index) = manager.allocate_cube(1.0) {
            allocated.push(index);
        }
        assert_eq!(manager.live_count(), MAX_ENTITIES);
        assert!(manager.allocate_cube(1.0).is_none());
    }
}
