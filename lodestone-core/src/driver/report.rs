//! Crash reports and per-tick summaries.

use std::fmt::{self, Display};

use lodestone_utils::{BlockId, BlockPos, EntityId};

use super::TickPhase;
use crate::capture::CaptureRecord;
use crate::cause::CauseFrame;
use crate::error::SimulationFault;
use crate::ticks::EntryHandle;

/// The unit of work that faulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashTarget {
    /// A mutation submitted through the inbox.
    Inbox {
        /// Target position of the mutation.
        pos: BlockPos,
    },
    /// A scheduled block update.
    ScheduledTick {
        /// Position of the block.
        pos: BlockPos,
        /// The handler kind.
        block: BlockId,
        /// The entry that ran.
        handle: EntryHandle,
    },
    /// An entity update.
    Entity {
        /// The entity.
        id: EntityId,
        /// Its type name.
        type_name: &'static str,
    },
    /// A block entity update.
    BlockEntity {
        /// Position of the block entity.
        pos: BlockPos,
        /// Its type name.
        type_name: &'static str,
    },
    /// A block event delivery.
    BlockEvent {
        /// Position of the block.
        pos: BlockPos,
        /// The block kind.
        block: BlockId,
        /// The event id.
        id: u8,
    },
}

impl CrashTarget {
    fn description(&self) -> &'static str {
        match self {
            Self::Inbox { .. } => "Applying queued mutation",
            Self::ScheduledTick { .. } => "Ticking block",
            Self::Entity { .. } => "Ticking entity",
            Self::BlockEntity { .. } => "Ticking block entity",
            Self::BlockEvent { .. } => "Delivering block event",
        }
    }

    fn section(&self) -> &'static str {
        match self {
            Self::Inbox { .. } => "Mutation being applied",
            Self::ScheduledTick { .. } => "Block being ticked",
            Self::Entity { .. } => "Entity being ticked",
            Self::BlockEntity { .. } => "Block entity being ticked",
            Self::BlockEvent { .. } => "Block event being delivered",
        }
    }
}

impl Display for CrashTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbox { pos } => write!(f, "queued mutation at {pos}"),
            Self::ScheduledTick { pos, block, handle } => {
                write!(f, "block {block} at {pos} ({handle})")
            }
            Self::Entity { id, type_name } => write!(f, "{id} ({type_name})"),
            Self::BlockEntity { pos, type_name } => write!(f, "{type_name} at {pos}"),
            Self::BlockEvent { pos, block, id } => write!(f, "event {id} for block {block} at {pos}"),
        }
    }
}

/// A recovered fault in one unit of work.
///
/// The unit's changes have already been rolled back when the report is made;
/// `in_flight` lists what was undone.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashReport {
    /// The tick the fault happened on.
    pub tick: u64,
    /// The phase the fault happened in.
    pub phase: TickPhase,
    /// The unit that faulted.
    pub target: CrashTarget,
    /// The cause active when the unit ran.
    pub cause: CauseFrame,
    /// The original error.
    pub error: SimulationFault,
    /// The captured changes that were rolled back.
    pub in_flight: Vec<CaptureRecord>,
}

impl Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---- Tick Crash Report ----")?;
        writeln!(f, "Description: {}", self.target.description())?;
        writeln!(f, "Error: {}", self.error)?;
        writeln!(f)?;
        writeln!(f, "-- {} --", self.target.section())?;
        writeln!(f, "Details: {}", self.target)?;
        writeln!(f, "Tick: {}", self.tick)?;
        writeln!(f, "Phase: {}", self.phase)?;
        writeln!(f, "Cause: {}", self.cause)?;
        writeln!(f)?;
        write!(f, "-- Rolled back changes ({}) --", self.in_flight.len())?;
        for record in &self.in_flight {
            write!(f, "\n  {record}")?;
        }
        Ok(())
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    /// The tick number.
    pub tick: u64,
    /// Inbox mutations applied.
    pub inbox_applied: usize,
    /// Scheduled entries that ran.
    pub scheduled_run: usize,
    /// Scheduled entries dropped because their block had changed.
    pub scheduled_stale: usize,
    /// Entities ticked. Zero when the entity pass was skipped.
    pub entities_ticked: usize,
    /// Whether the entity pass was skipped for lack of players.
    pub entity_pass_skipped: bool,
    /// Block entities ticked.
    pub block_entities_ticked: usize,
    /// Block events delivered.
    pub block_events_delivered: usize,
    /// Units whose captured changes were all kept.
    pub committed: usize,
    /// Units whose captured changes were all reverted by the gate.
    pub vetoed: usize,
    /// Units the gate partially approved.
    pub partially_approved: usize,
    /// Faults recovered this tick.
    pub crashes: Vec<CrashReport>,
}

impl TickSummary {
    pub(crate) fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }
}

impl Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {}: {} scheduled ({} stale), {} inbox, {} entities{}, {} block entities, {} block events; {} committed, {} vetoed, {} partial, {} crashed",
            self.tick,
            self.scheduled_run,
            self.scheduled_stale,
            self.inbox_applied,
            self.entities_ticked,
            if self.entity_pass_skipped { " (skipped)" } else { "" },
            self.block_entities_ticked,
            self.block_events_delivered,
            self.committed,
            self.vetoed,
            self.partially_approved,
            self.crashes.len()
        )
    }
}
