//! The simulated world and the handle simulation code uses to change it.

mod block_entity;
mod block_event;
mod context;
mod entity;
mod inbox;

pub use block_entity::{BlockEntity, BlockEntityId};
pub use block_event::BlockEvent;
pub use context::TickContext;
pub use entity::{EntityBehaviour, EntitySnapshot};
pub use inbox::{MutationSender, PendingMutation};

pub(crate) use block_entity::BlockEntityStorage;
pub(crate) use block_event::BlockEventQueue;
pub(crate) use context::{ScheduleChange, stamp_cause};
pub(crate) use entity::EntityStorage;
pub(crate) use inbox::{MutationInbox, Submission};

use std::sync::Arc;

use lodestone_utils::{BlockId, BlockPos, BlockState, EntityId};
use rustc_hash::FxHashMap;

use crate::behavior::{BlockBehaviour, BlockBehaviors};
use crate::capture::{CaptureTarget, CapturedState};
use crate::error::SimulationFault;

/// The state of one world.
///
/// Only the simulation thread owns a `World`. Setup methods here apply
/// directly; during a tick every change goes through a [`TickContext`] so it
/// can be captured and attributed.
pub struct World {
    blocks: FxHashMap<BlockPos, BlockState>,
    pub(crate) entities: EntityStorage,
    pub(crate) block_entities: BlockEntityStorage,
    pub(crate) block_events: BlockEventQueue,
    behaviors: BlockBehaviors,
    pub(crate) inbox: MutationInbox,
}

impl World {
    /// Creates an empty world using `behaviors` for its blocks.
    #[must_use]
    pub fn new(behaviors: BlockBehaviors, inbox_capacity: usize) -> Self {
        Self {
            blocks: FxHashMap::default(),
            entities: EntityStorage::default(),
            block_entities: BlockEntityStorage::default(),
            block_events: BlockEventQueue::default(),
            behaviors,
            inbox: MutationInbox::new(inbox_capacity),
        }
    }

    /// Returns the block state at `pos`. Unset positions are air.
    #[must_use]
    pub fn block_state(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).copied().unwrap_or(BlockState::AIR)
    }

    /// Sets a block without capturing or notifying anything.
    pub fn set_block(&mut self, pos: BlockPos, state: BlockState) -> BlockState {
        let previous = if state.is_air() {
            self.blocks.remove(&pos)
        } else {
            self.blocks.insert(pos, state)
        };
        previous.unwrap_or(BlockState::AIR)
    }

    /// Iterates the non-air blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockPos, BlockState)> + '_ {
        self.blocks.iter().map(|(pos, state)| (*pos, *state))
    }

    /// Returns the behaviour registered for `block`.
    #[must_use]
    pub fn behavior(&self, block: BlockId) -> Option<Arc<dyn BlockBehaviour>> {
        self.behaviors.get(block)
    }

    /// Adds an entity outside of any tick.
    pub fn spawn_entity(
        &mut self,
        snapshot: EntitySnapshot,
        brain: Option<Box<dyn EntityBehaviour>>,
    ) -> EntityId {
        let id = self.entities.allocate(brain);
        self.entities.set(id, Some(snapshot));
        id
    }

    /// Returns the state of an entity, if it exists.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.get(id)
    }

    /// Ids of the existing entities in registration order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.live_ids()
    }

    /// Adds a block entity outside of any tick, replacing any other one at `pos`.
    pub fn add_block_entity(&mut self, pos: BlockPos, block_entity: Box<dyn BlockEntity>) -> BlockEntityId {
        self.block_entities.add(pos, block_entity)
    }

    /// Returns true if a block entity that is not marked for removal exists at `pos`.
    #[must_use]
    pub fn has_block_entity(&self, pos: BlockPos) -> bool {
        self.block_entities.contains(pos)
    }

    /// Number of block entities, including ones waiting to be merged or purged.
    #[must_use]
    pub fn block_entity_count(&self) -> usize {
        self.block_entities.len()
    }

    /// Number of block events waiting for delivery.
    #[must_use]
    pub fn pending_block_events(&self) -> usize {
        self.block_events.len()
    }

    /// Returns a handle other threads can use to submit mutations.
    #[must_use]
    pub fn inbox(&self) -> MutationSender {
        self.inbox.sender()
    }

    /// Reads the current state of a capture target.
    #[must_use]
    pub fn read(&self, target: CaptureTarget) -> CapturedState {
        match target {
            CaptureTarget::Block(pos) => CapturedState::Block(self.block_state(pos)),
            CaptureTarget::Entity(id) => CapturedState::Entity(self.entities.get(id)),
            CaptureTarget::BlockEntity(pos) => CapturedState::BlockEntity(self.block_entities.live_at(pos)),
        }
    }

    /// Writes a state to a capture target without recording it.
    pub fn write(&mut self, target: CaptureTarget, state: CapturedState) -> Result<(), SimulationFault> {
        match (target, state) {
            (CaptureTarget::Block(pos), CapturedState::Block(state)) => {
                self.set_block(pos, state);
                Ok(())
            }
            (CaptureTarget::Entity(id), CapturedState::Entity(state)) => {
                if self.entities.set(id, state) {
                    Ok(())
                } else {
                    Err(SimulationFault::InvalidState {
                        target: target.to_string(),
                        reason: "unknown entity",
                    })
                }
            }
            (CaptureTarget::BlockEntity(pos), CapturedState::BlockEntity(id)) => {
                if self.block_entities.set_live(pos, id) {
                    Ok(())
                } else {
                    Err(SimulationFault::InvalidState {
                        target: target.to_string(),
                        reason: "unknown block entity",
                    })
                }
            }
            _ => Err(SimulationFault::InvalidState {
                target: target.to_string(),
                reason: "state kind does not match the target",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use lodestone_utils::math::Vector3;

    use super::*;

    fn world() -> World {
        World::new(BlockBehaviors::new(), 16)
    }

    #[test]
    fn test_air_is_not_stored() {
        let mut world = world();
        let pos = BlockPos::new(1, 2, 3);
        let stone = BlockState::new(BlockId(1), 0);

        assert_eq!(world.set_block(pos, stone), BlockState::AIR);
        assert_eq!(world.block_state(pos), stone);
        assert_eq!(world.set_block(pos, BlockState::AIR), stone);
        assert_eq!(world.blocks().count(), 0);
    }

    #[test]
    fn test_write_rejects_mismatched_kinds() {
        let mut world = world();
        let result = world.write(
            CaptureTarget::Block(BlockPos::new(0, 0, 0)),
            CapturedState::Entity(None),
        );
        assert!(matches!(result, Err(SimulationFault::InvalidState { .. })));

        let result = world.write(CaptureTarget::Entity(EntityId(42)), CapturedState::Entity(None));
        assert!(matches!(result, Err(SimulationFault::InvalidState { .. })));
    }

    #[test]
    fn test_read_write_entity() {
        let mut world = world();
        let id = world.spawn_entity(EntitySnapshot::default(), None);
        let moved = EntitySnapshot::at(Vector3::new(1.0, 2.0, 3.0));

        world
            .write(CaptureTarget::Entity(id), CapturedState::Entity(Some(moved)))
            .expect("entity exists");
        assert_eq!(world.read(CaptureTarget::Entity(id)), CapturedState::Entity(Some(moved)));
        assert_eq!(world.entity_ids(), vec![id]);
    }

    #[test]
    fn test_read_write_block_entity_slot() {
        struct Idle;
        impl BlockEntity for Idle {
            fn tick(&mut self, _ctx: &mut TickContext<'_>, _pos: BlockPos) -> Result<(), SimulationFault> {
                Ok(())
            }

            fn type_name(&self) -> &'static str {
                "idle"
            }
        }

        let mut world = world();
        let pos = BlockPos::new(0, 1, 0);
        let target = CaptureTarget::BlockEntity(pos);
        assert_eq!(world.read(target), CapturedState::BlockEntity(None));

        let id = world.add_block_entity(pos, Box::new(Idle));
        assert_eq!(world.read(target), CapturedState::BlockEntity(Some(id)));

        world.write(target, CapturedState::BlockEntity(None)).expect("empty slot");
        assert!(!world.has_block_entity(pos));
        world.write(target, CapturedState::BlockEntity(Some(id))).expect("known id");
        assert!(world.has_block_entity(pos));

        let elsewhere = world.write(
            CaptureTarget::BlockEntity(pos.offset(1, 0, 0)),
            CapturedState::BlockEntity(Some(id)),
        );
        assert!(matches!(elsewhere, Err(SimulationFault::InvalidState { .. })));
    }
}
