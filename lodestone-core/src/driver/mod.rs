//! The tick driver.
//!
//! One call to [`TickDriver::tick`] runs the phases in order:
//! `Scheduling -> EntityPass -> TileEntityPass -> BlockEventFlush -> Idle`.
//!
//! Every piece of simulation code runs as a *unit*: the driver pushes a cause
//! frame, opens the capture session, runs the code, closes the session, hands
//! the batch to the [`EventGate`] and applies the decision before popping the
//! frame. A unit that fails or panics has its in-flight changes and its
//! scheduling changes rolled back and produces a [`CrashReport`]; the pass
//! then carries on with the next unit.

mod phase;
mod report;

pub use phase::TickPhase;
pub use report::{CrashReport, CrashTarget, TickSummary};

use std::panic::{self, AssertUnwindSafe};

use lodestone_utils::{BlockId, BlockPos};
use rustc_hash::FxHashSet;

use crate::behavior::BlockBehaviors;
use crate::capture::{CaptureRecord, CaptureSession};
use crate::cause::{Actor, CauseFrame, CauseStack};
use crate::config::TickConfig;
use crate::error::SimulationFault;
use crate::gate::{ApproveAll, Decision, EventGate};
use crate::ticks::{EntryHandle, ScheduledEntry, ScheduledUpdateQueue};
use crate::world::{PendingMutation, ScheduleChange, Submission, TickContext, World, stamp_cause};

enum UnitOutcome {
    Empty,
    Committed,
    Vetoed,
    PartiallyApproved,
    Crashed,
}

/// Drives the simulation of one world.
pub struct TickDriver {
    world: World,
    scheduled: ScheduledUpdateQueue<BlockId>,
    causes: CauseStack,
    capture: CaptureSession,
    gate: Box<dyn EventGate>,
    config: TickConfig,
    game_time: u64,
    phase: TickPhase,
    idle_ticks: u32,
}

impl TickDriver {
    /// Creates a driver for an empty world that approves every change.
    #[must_use]
    pub fn new(config: TickConfig, behaviors: BlockBehaviors) -> Self {
        Self {
            world: World::new(behaviors, config.inbox_capacity),
            scheduled: ScheduledUpdateQueue::new(),
            causes: CauseStack::new(),
            capture: CaptureSession::new(),
            gate: Box::new(ApproveAll),
            config,
            game_time: 0,
            phase: TickPhase::Idle,
            idle_ticks: 0,
        }
    }

    /// Replaces the event gate.
    pub fn set_gate(&mut self, gate: impl EventGate + 'static) {
        self.gate = Box::new(gate);
    }

    /// Read-only access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct access to the world between ticks. Changes made here are not captured.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The number of the last tick run.
    #[must_use]
    pub const fn game_time(&self) -> u64 {
        self.game_time
    }

    /// The phase the driver is in. [`TickPhase::Idle`] between ticks.
    #[must_use]
    pub const fn phase(&self) -> TickPhase {
        self.phase
    }

    /// The configuration the driver was created with.
    #[must_use]
    pub const fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Pending scheduled updates at `pos`, in the order they will run.
    #[must_use]
    pub fn get_scheduled(&self, pos: BlockPos) -> Vec<&ScheduledEntry<BlockId>> {
        self.scheduled.scheduled_at(pos)
    }

    /// Schedules an update for whatever block is currently at `pos`.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn add_scheduled(&mut self, pos: BlockPos, delay: i32, priority: i32) -> EntryHandle {
        let block = self.world.block_state(pos).block;
        let handle = self.scheduled.schedule(pos, block, delay, priority);
        stamp_cause(&mut self.scheduled, &self.causes, &self.capture, handle);
        handle
    }

    /// Cancels a scheduled update. Only the handle identifies the entry.
    pub fn remove_scheduled(&mut self, _pos: BlockPos, handle: EntryHandle) -> bool {
        self.scheduled.cancel(handle)
    }

    /// Changes the priority of a pending update.
    pub fn set_scheduled_priority(&mut self, handle: EntryHandle, priority: i32) -> bool {
        self.scheduled.set_priority(handle, priority)
    }

    /// Number of pending scheduled updates.
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// The actors responsible for the current point of the tick, most specific first.
    #[must_use]
    pub fn current_cause(&self) -> Vec<Actor> {
        self.causes.current_cause()
    }

    /// Runs one tick.
    ///
    /// # Panics
    /// Panics if the cause stack or capture session is unbalanced at the end of
    /// the tick. Faults in simulation code never panic here.
    pub fn tick(&mut self) -> TickSummary {
        self.game_time += 1;
        let _span = tracing::debug_span!("tick", tick = self.game_time).entered();
        let mut summary = TickSummary::new(self.game_time);

        self.advance(TickPhase::Scheduling);
        self.run_scheduling(&mut summary);

        self.advance(TickPhase::EntityPass);
        self.run_entity_pass(&mut summary);

        self.advance(TickPhase::TileEntityPass);
        self.run_block_entity_pass(&mut summary);

        self.advance(TickPhase::BlockEventFlush);
        self.run_block_event_flush(&mut summary);

        self.advance(TickPhase::Idle);
        self.causes.end_tick();
        assert!(
            !self.capture.is_open(),
            "capture session still open at depth {} at the end of tick {}",
            self.capture.depth(),
            self.game_time
        );

        summary
    }

    fn advance(&mut self, next: TickPhase) {
        assert_eq!(
            self.phase.next(),
            next,
            "tick phase {} cannot be followed by {next}",
            self.phase
        );
        self.phase = next;
    }

    fn run_scheduling(&mut self, summary: &mut TickSummary) {
        let _span = tracing::debug_span!("scheduling").entered();
        self.scheduled.advance_to(self.game_time);

        for submission in self.world.inbox.drain() {
            self.apply_submission(submission, summary);
            summary.inbox_applied += 1;
        }

        let due = self
            .scheduled
            .drain_due_limited(self.game_time, self.config.max_scheduled_ticks_per_tick);
        for entry in due {
            let state = self.world.block_state(entry.pos);
            let behavior = if state.block == entry.tick_type {
                self.world.behavior(entry.tick_type)
            } else {
                None
            };
            let Some(behavior) = behavior else {
                log::trace!(
                    "Skipping stale scheduled tick {} for {} at {}",
                    entry.handle,
                    entry.tick_type,
                    entry.pos
                );
                summary.scheduled_stale += 1;
                continue;
            };

            let mut frame = CauseFrame::block(entry.pos, entry.tick_type);
            if let Some(stamp) = &entry.cause {
                frame.inherit(stamp);
            }
            let target = CrashTarget::ScheduledTick {
                pos: entry.pos,
                block: entry.tick_type,
                handle: entry.handle,
            };
            self.run_unit(frame, target, summary, |ctx| {
                behavior.tick(ctx, entry.pos, state)
            });
            summary.scheduled_run += 1;
        }
    }

    fn apply_submission(&mut self, submission: Submission, summary: &mut TickSummary) {
        let frame = submission
            .notifier
            .map(CauseFrame::notifier)
            .unwrap_or_default();

        match submission.mutation {
            PendingMutation::SetBlock {
                pos,
                state,
                notify_neighbors,
            } => {
                self.run_unit(frame, CrashTarget::Inbox { pos }, summary, |ctx| {
                    ctx.set_block(pos, state)?;
                    if notify_neighbors {
                        ctx.notify_neighbors(pos)?;
                    }
                    Ok(())
                });
            }
            PendingMutation::ScheduleTick {
                pos,
                block,
                delay,
                priority,
            } => {
                self.run_unit(frame, CrashTarget::Inbox { pos }, summary, |ctx| {
                    ctx.schedule_tick(pos, block, delay, priority);
                    Ok(())
                });
            }
        }
    }

    fn run_entity_pass(&mut self, summary: &mut TickSummary) {
        let _span = tracing::debug_span!("entity_pass").entered();

        if self.world.entities.has_players() {
            self.idle_ticks = 0;
        } else {
            let idle = self.idle_ticks;
            self.idle_ticks = idle.saturating_add(1);
            if idle >= self.config.entity_idle_timeout_ticks {
                summary.entity_pass_skipped = true;
                return;
            }
        }

        // Entities spawned from here on wait for the next tick.
        for id in self.world.entities.live_ids() {
            if self.world.entities.get(id).is_none() {
                continue;
            }
            let Some(mut brain) = self.world.entities.take_brain(id) else {
                continue;
            };

            let frame = CauseFrame::entity(id).with_notifier(brain.notifier());
            let target = CrashTarget::Entity {
                id,
                type_name: brain.type_name(),
            };
            self.run_unit(frame, target, summary, |ctx| brain.tick(ctx, id));
            self.world.entities.restore_brain(id, brain);
            summary.entities_ticked += 1;
        }

        let pruned = self.world.entities.prune();
        if pruned > 0 {
            log::debug!("Pruned {pruned} removed entities");
        }
    }

    fn run_block_entity_pass(&mut self, summary: &mut TickSummary) {
        let _span = tracing::debug_span!("block_entity_pass").entered();

        let count = self.world.block_entities.begin_pass();
        for index in 0..count {
            let Some((pos, mut brain)) = self.world.block_entities.take(index) else {
                continue;
            };
            let target = CrashTarget::BlockEntity {
                pos,
                type_name: brain.type_name(),
            };
            self.run_unit(CauseFrame::block_entity(pos), target, summary, |ctx| {
                brain.tick(ctx, pos)
            });
            self.world.block_entities.restore(index, brain);
            summary.block_entities_ticked += 1;
        }
        self.world.block_entities.end_pass();
    }

    fn run_block_event_flush(&mut self, summary: &mut TickSummary) {
        let _span = tracing::debug_span!("block_event_flush").entered();

        let mut budget = self.config.max_block_events_per_tick;
        while budget > 0 && !self.world.block_events.is_empty() {
            let round = self.world.block_events.take_round(budget);
            budget -= round.len();

            for event in round {
                let state = self.world.block_state(event.pos);
                if state.block != event.block {
                    continue;
                }
                let Some(behavior) = self.world.behavior(event.block) else {
                    continue;
                };
                let frame = CauseFrame::block(event.pos, event.block).with_notifier(event.notifier);
                let target = CrashTarget::BlockEvent {
                    pos: event.pos,
                    block: event.block,
                    id: event.id,
                };
                self.run_unit(frame, target, summary, |ctx| {
                    behavior.triggered_event(ctx, event.pos, state, event.id, event.param)
                });
                summary.block_events_delivered += 1;
            }
        }

        if !self.world.block_events.is_empty() {
            log::debug!(
                "Carrying {} block events over to the next tick",
                self.world.block_events.len()
            );
        }
    }

    fn run_unit<F>(&mut self, frame: CauseFrame, target: CrashTarget, summary: &mut TickSummary, body: F)
    where
        F: FnOnce(&mut TickContext<'_>) -> Result<(), SimulationFault>,
    {
        let baseline = self.causes.push(frame);
        self.capture.open();

        let (result, schedule_changes) = {
            let mut ctx = TickContext::new(
                &mut self.world,
                &mut self.scheduled,
                &mut self.causes,
                &mut self.capture,
                &self.config,
                self.game_time,
            );
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)));
            (result, ctx.into_schedule_changes())
        };
        let fault = match result {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(payload) => Some(SimulationFault::from_panic(payload.as_ref())),
        };
        let cause = self.causes.current();

        let outcome = match fault {
            None => {
                let batch = self
                    .capture
                    .close()
                    .expect("unit capture was not the outermost level when the unit finished");
                if batch.is_empty() {
                    UnitOutcome::Empty
                } else {
                    let decision = self.gate.decide(&cause, &batch);
                    self.apply_decision(&batch, decision)
                }
            }
            Some(error) => {
                let in_flight = self.capture.force_close();
                revert(&mut self.world, in_flight.iter().rev());
                self.undo_schedule_changes(schedule_changes);
                let report = CrashReport {
                    tick: self.game_time,
                    phase: self.phase,
                    target,
                    cause,
                    error,
                    in_flight,
                };
                log::error!("{report}");
                summary.crashes.push(report);
                UnitOutcome::Crashed
            }
        };

        self.causes.pop_to(baseline);

        match outcome {
            UnitOutcome::Committed => summary.committed += 1,
            UnitOutcome::Vetoed => summary.vetoed += 1,
            UnitOutcome::PartiallyApproved => summary.partially_approved += 1,
            UnitOutcome::Empty | UnitOutcome::Crashed => {}
        }
    }

    fn undo_schedule_changes(&mut self, changes: Vec<ScheduleChange>) {
        if !changes.is_empty() {
            log::debug!("Undoing {} scheduling change(s)", changes.len());
        }
        for change in changes.into_iter().rev() {
            match change {
                ScheduleChange::Added(handle) => {
                    self.scheduled.cancel(handle);
                }
                ScheduleChange::Cancelled(entry) => {
                    let handle = entry.handle;
                    if !self.scheduled.restore(entry) {
                        log::warn!("Scheduled tick {handle} was already pending when restoring it");
                    }
                }
            }
        }
    }

    fn apply_decision(&mut self, batch: &[CaptureRecord], decision: Decision) -> UnitOutcome {
        match decision {
            Decision::Approve => UnitOutcome::Committed,
            Decision::Veto => {
                log::debug!("Vetoed {} captured change(s)", batch.len());
                revert(&mut self.world, batch.iter().rev());
                UnitOutcome::Vetoed
            }
            Decision::PartialApprove(indices) => {
                let mut approved = FxHashSet::default();
                for index in indices {
                    if index < batch.len() {
                        approved.insert(index);
                    } else {
                        log::warn!(
                            "Ignoring approval of record {index} in a batch of {}",
                            batch.len()
                        );
                    }
                }
                log::debug!(
                    "Partially approved {} of {} captured change(s)",
                    approved.len(),
                    batch.len()
                );

                revert(
                    &mut self.world,
                    batch
                        .iter()
                        .enumerate()
                        .rev()
                        .filter(|(index, _)| !approved.contains(index))
                        .map(|(_, record)| record),
                );
                // Reverting an earlier record can clobber an approved later one on the same target.
                for (index, record) in batch.iter().enumerate() {
                    if approved.contains(&index)
                        && let Err(err) = self.world.write(record.target, record.after)
                    {
                        log::warn!("Failed to reapply {}: {err}", record.target);
                    }
                }
                UnitOutcome::PartiallyApproved
            }
        }
    }
}

fn revert<'r>(world: &mut World, records: impl Iterator<Item = &'r CaptureRecord>) {
    for record in records {
        if let Err(err) = world.write(record.target, record.before) {
            log::warn!("Failed to roll back {}: {err}", record.target);
        }
    }
}
