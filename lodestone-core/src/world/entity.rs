//! Entity state and storage.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use lodestone_utils::EntityId;
use lodestone_utils::math::Vector3;
use uuid::Uuid;

use super::TickContext;
use crate::error::SimulationFault;

/// The captured state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntitySnapshot {
    /// World position.
    pub position: Vector3<f64>,
    /// Yaw and pitch in degrees.
    pub rotation: (f32, f32),
}

impl EntitySnapshot {
    /// Creates a snapshot at `position` with no rotation.
    #[must_use]
    pub const fn at(position: Vector3<f64>) -> Self {
        Self {
            position,
            rotation: (0.0, 0.0),
        }
    }
}

impl Display for EntitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}) yaw {:.1} pitch {:.1}",
            self.position.x, self.position.y, self.position.z, self.rotation.0, self.rotation.1
        )
    }
}

/// Per-entity simulation logic, run once per tick during the entity pass.
pub trait EntityBehaviour: Send {
    /// Advances the entity by one tick.
    fn tick(&mut self, ctx: &mut TickContext<'_>, id: EntityId) -> Result<(), SimulationFault>;

    /// Players keep the entity pass running.
    fn is_player(&self) -> bool {
        false
    }

    /// The user this entity acts for. Its mutations are attributed to that user.
    fn notifier(&self) -> Option<Uuid> {
        None
    }

    /// A short type name used in crash reports.
    fn type_name(&self) -> &'static str {
        "entity"
    }
}

struct EntityEntry {
    state: Option<EntitySnapshot>,
    brain: Option<Box<dyn EntityBehaviour>>,
    player: bool,
}

/// Every entity in a world, in registration order.
///
/// An entry exists from allocation until it is pruned. Its state is `None`
/// while the entity does not exist in the world, which is the case between
/// allocation and the spawn mutation, after removal, and after a vetoed spawn.
#[derive(Default)]
pub(crate) struct EntityStorage {
    entries: BTreeMap<EntityId, EntityEntry>,
    next_id: i32,
}

impl EntityStorage {
    pub fn allocate(&mut self, brain: Option<Box<dyn EntityBehaviour>>) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        let player = brain.as_ref().is_some_and(|brain| brain.is_player());
        self.entries.insert(
            id,
            EntityEntry {
                state: None,
                brain,
                player,
            },
        );
        id
    }

    pub fn get(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entries.get(&id).and_then(|entry| entry.state)
    }

    /// Returns false if the id was never allocated or has been pruned.
    pub fn set(&mut self, id: EntityId, state: Option<EntitySnapshot>) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Ids of the entities that currently exist, in registration order.
    pub fn live_ids(&self) -> Vec<EntityId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state.is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn has_players(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.player && entry.state.is_some())
    }

    pub fn take_brain(&mut self, id: EntityId) -> Option<Box<dyn EntityBehaviour>> {
        self.entries.get_mut(&id).and_then(|entry| entry.brain.take())
    }

    pub fn restore_brain(&mut self, id: EntityId, brain: Box<dyn EntityBehaviour>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.brain = Some(brain);
        }
    }

    /// Drops every entry without a state. Returns how many were dropped.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.state.is_some());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
