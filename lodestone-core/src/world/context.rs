use std::panic::{self, AssertUnwindSafe};

use lodestone_utils::math::Vector3;
use lodestone_utils::{BlockId, BlockPos, BlockState, EntityId};
use uuid::Uuid;

use super::{BlockEntity, BlockEntityId, BlockEvent, EntityBehaviour, EntitySnapshot, World};
use crate::capture::{CaptureSession, CaptureTarget, CapturedState};
use crate::cause::{Actor, CauseFrame, CauseStack};
use crate::config::TickConfig;
use crate::error::SimulationFault;
use crate::ticks::{EntryHandle, ScheduledEntry, ScheduledUpdateQueue};

/// A change a unit made to the scheduled update queue, kept so a faulted unit can be undone.
pub(crate) enum ScheduleChange {
    Added(EntryHandle),
    Cancelled(ScheduledEntry<BlockId>),
}

/// The handle simulation code gets while a tick is running.
///
/// Every read and write of the world during a tick goes through here, so each
/// mutation is recorded into the open capture session and attributed to the
/// cause frames on the stack.
pub struct TickContext<'a> {
    world: &'a mut World,
    scheduled: &'a mut ScheduledUpdateQueue<BlockId>,
    causes: &'a mut CauseStack,
    capture: &'a mut CaptureSession,
    config: &'a TickConfig,
    game_time: u64,
    update_depth: u32,
    schedule_changes: Vec<ScheduleChange>,
}

impl<'a> TickContext<'a> {
    pub(crate) fn new(
        world: &'a mut World,
        scheduled: &'a mut ScheduledUpdateQueue<BlockId>,
        causes: &'a mut CauseStack,
        capture: &'a mut CaptureSession,
        config: &'a TickConfig,
        game_time: u64,
    ) -> Self {
        Self {
            world,
            scheduled,
            causes,
            capture,
            config,
            game_time,
            update_depth: 0,
            schedule_changes: Vec::new(),
        }
    }

    /// Consumes the context, returning the scheduling changes made through it in order.
    pub(crate) fn into_schedule_changes(self) -> Vec<ScheduleChange> {
        self.schedule_changes
    }

    /// The tick being simulated.
    #[must_use]
    pub const fn game_time(&self) -> u64 {
        self.game_time
    }

    /// Read-only access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        self.world
    }

    /// The block state at `pos`. Unset positions are air.
    #[must_use]
    pub fn block_state(&self, pos: BlockPos) -> BlockState {
        self.world.block_state(pos)
    }

    /// The state of an entity, if it exists.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.world.entity(id)
    }

    /// Changes a capture target, recording the change if a session is capturing.
    ///
    /// Returns the state the target had before. Air block states are
    /// normalized first, and writing the state a target already has is a
    /// no-op and is not recorded.
    pub fn apply_mutation(
        &mut self,
        target: CaptureTarget,
        after: CapturedState,
    ) -> Result<CapturedState, SimulationFault> {
        let after = after.normalized();
        if !after.fits(&target) {
            return Err(SimulationFault::InvalidState {
                target: target.to_string(),
                reason: "state kind does not match the target",
            });
        }
        let before = self.world.read(target);
        if before == after {
            return Ok(before);
        }
        self.world.write(target, after)?;
        self.capture
            .record(target, before, after, self.causes.current());
        Ok(before)
    }

    /// Replaces the block at `pos`, returning the previous state.
    pub fn set_block(&mut self, pos: BlockPos, state: BlockState) -> Result<BlockState, SimulationFault> {
        let previous = self.world.block_state(pos);
        self.apply_mutation(CaptureTarget::Block(pos), CapturedState::Block(state))?;
        Ok(previous)
    }

    /// Adds an entity to the world.
    ///
    /// The entity is first ticked on the tick after it was spawned. If the
    /// spawn is vetoed the id never resolves.
    pub fn spawn_entity(
        &mut self,
        snapshot: EntitySnapshot,
        brain: Option<Box<dyn EntityBehaviour>>,
    ) -> Result<EntityId, SimulationFault> {
        let id = self.world.entities.allocate(brain);
        self.apply_mutation(CaptureTarget::Entity(id), CapturedState::Entity(Some(snapshot)))?;
        Ok(id)
    }

    /// Moves an existing entity to `position`.
    pub fn move_entity(&mut self, id: EntityId, position: Vector3<f64>) -> Result<(), SimulationFault> {
        let Some(mut snapshot) = self.world.entity(id) else {
            return Err(SimulationFault::InvalidState {
                target: id.to_string(),
                reason: "entity does not exist",
            });
        };
        snapshot.position = position;
        self.apply_mutation(CaptureTarget::Entity(id), CapturedState::Entity(Some(snapshot)))?;
        Ok(())
    }

    /// Removes an entity. Removing an entity that does not exist is a no-op.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<(), SimulationFault> {
        if self.world.entity(id).is_none() {
            return Ok(());
        }
        self.apply_mutation(CaptureTarget::Entity(id), CapturedState::Entity(None))?;
        Ok(())
    }

    /// Schedules an update for `block` at `pos`, `delay` ticks from now.
    ///
    /// While a notifier is active and captures are not being ignored, the
    /// entry is stamped with that notifier and the currently ticking block and
    /// block entity. When the entry runs, the stamped notifier and block entity
    /// are restored; the ticking block is always the entry's own.
    ///
    /// Scheduling is not part of the capture batch, so a veto keeps the entry.
    /// It is dropped again if the unit faults.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn schedule_tick(&mut self, pos: BlockPos, block: BlockId, delay: i32, priority: impl Into<i32>) -> EntryHandle {
        let handle = self.scheduled.schedule(pos, block, delay, priority.into());
        stamp_cause(self.scheduled, self.causes, self.capture, handle);
        self.schedule_changes.push(ScheduleChange::Added(handle));
        handle
    }

    /// Cancels a scheduled update. Returns false if it already ran or was cancelled.
    ///
    /// The entry comes back if the unit faults.
    pub fn cancel_tick(&mut self, handle: EntryHandle) -> bool {
        let Some(entry) = self.scheduled.take(handle) else {
            return false;
        };
        self.schedule_changes.push(ScheduleChange::Cancelled(entry));
        true
    }

    /// Number of updates pending at `pos`.
    #[must_use]
    pub fn scheduled_count(&self, pos: BlockPos) -> usize {
        self.scheduled.count_at(pos)
    }

    /// Queues a block event for the block currently at `pos`. Delivered during the block event flush.
    pub fn queue_block_event(&mut self, pos: BlockPos, id: u8, param: i32) -> bool {
        let block = self.world.block_state(pos).block;
        self.world.block_events.push(BlockEvent {
            pos,
            block,
            id,
            param,
            notifier: self.causes.current_notifier(),
        })
    }

    /// Runs `neighbor_changed` on the behaviours of the six neighbours of `pos`.
    ///
    /// Each neighbour runs in its own cause scope with itself as the ticking
    /// block, sharing the open capture. Chains deeper than the configured
    /// update depth are dropped.
    pub fn notify_neighbors(&mut self, pos: BlockPos) -> Result<(), SimulationFault> {
        if self.update_depth >= self.config.max_update_depth {
            log::warn!(
                "Dropping neighbour updates from {pos}: update depth {} reached",
                self.config.max_update_depth
            );
            return Ok(());
        }

        for neighbor in pos.neighbors() {
            let state = self.world.block_state(neighbor);
            if state.is_air() {
                continue;
            }
            let Some(behavior) = self.world.behavior(state.block) else {
                continue;
            };

            self.update_depth += 1;
            let result = self.with_cause(CauseFrame::block(neighbor, state.block), |ctx| {
                behavior.neighbor_changed(ctx, neighbor, state, pos)
            });
            self.update_depth -= 1;
            result?;
        }
        Ok(())
    }

    /// Runs `body` with `frame` pushed on the cause stack.
    ///
    /// Mutations made inside land in the same capture batch as the enclosing
    /// unit. The frame is popped on every exit path, including panics.
    pub fn with_cause<R>(&mut self, frame: CauseFrame, body: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.causes.push(frame);
        let nested = self.capture.is_open();
        if nested {
            self.capture.open();
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| body(self)));

        if nested && self.capture.is_open() {
            // The enclosing level is still open, so this never yields a batch.
            let _ = self.capture.close();
        }
        self.causes.pop_to(depth);
        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Runs `body` with capturing suspended.
    ///
    /// Mutations inside are applied directly, cannot be vetoed and do not
    /// stamp scheduled updates.
    pub fn ignoring_captures<R>(&mut self, body: impl FnOnce(&mut Self) -> R) -> R {
        self.capture.begin_ignoring();
        let result = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        if self.capture.is_ignoring() {
            self.capture.end_ignoring();
        }
        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Adds a block entity, replacing any other one at `pos`.
    ///
    /// Added during the block entity pass, it first ticks on the next tick.
    /// A vetoed or faulted add leaves the previous occupant in place.
    pub fn add_block_entity(
        &mut self,
        pos: BlockPos,
        block_entity: Box<dyn BlockEntity>,
    ) -> Result<BlockEntityId, SimulationFault> {
        let id = self.world.block_entities.insert(pos, block_entity);
        self.apply_mutation(CaptureTarget::BlockEntity(pos), CapturedState::BlockEntity(Some(id)))?;
        Ok(id)
    }

    /// Marks the block entity at `pos` for removal. Returns whether there was one.
    pub fn remove_block_entity(&mut self, pos: BlockPos) -> Result<bool, SimulationFault> {
        if !self.world.block_entities.contains(pos) {
            return Ok(false);
        }
        self.apply_mutation(CaptureTarget::BlockEntity(pos), CapturedState::BlockEntity(None))?;
        Ok(true)
    }

    /// The merged cause at this point.
    #[must_use]
    pub fn cause(&self) -> CauseFrame {
        self.causes.current()
    }

    /// The actors responsible for this point, most specific first.
    #[must_use]
    pub fn current_cause(&self) -> Vec<Actor> {
        self.causes.current_cause()
    }

    /// The innermost active notifier.
    #[must_use]
    pub fn notifier(&self) -> Option<Uuid> {
        self.causes.current_notifier()
    }

    /// Returns true if mutations are currently being recorded.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }
}

/// Stamps the current cause onto a freshly scheduled entry when a notifier is active.
pub(crate) fn stamp_cause(
    scheduled: &mut ScheduledUpdateQueue<BlockId>,
    causes: &CauseStack,
    capture: &CaptureSession,
    handle: EntryHandle,
) {
    if capture.is_ignoring() || !causes.has_notifier() {
        return;
    }
    let stamp = CauseFrame {
        ticking_entity: None,
        ticking_block_entity: causes.ticking_block_entity(),
        ticking_block: causes.ticking_block(),
        notifier: causes.current_notifier(),
    };
    scheduled.attach_cause(handle, stamp);
}
