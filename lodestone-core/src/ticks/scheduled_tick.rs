//! Scheduled update types.

use std::fmt::{self, Display};

use lodestone_utils::BlockPos;

use crate::cause::CauseFrame;

/// Named priority levels for scheduled updates.
///
/// When multiple entries fall due on the same game tick they run in ascending
/// priority value, then in insertion order. Any `i32` is a valid priority;
/// these are the levels the built-in behaviours use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum TickPriority {
    /// Extremely high priority (-3)
    ExtremelyHigh = -3,
    /// Very high priority (-2)
    VeryHigh = -2,
    /// High priority (-1)
    High = -1,
    /// Normal priority (0) - default
    #[default]
    Normal = 0,
    /// Low priority (1)
    Low = 1,
    /// Very low priority (2)
    VeryLow = 2,
    /// Extremely low priority (3)
    ExtremelyLow = 3,
}

impl TickPriority {
    /// Returns the numeric value of this priority.
    /// Lower values = higher priority.
    #[inline]
    #[must_use]
    pub const fn value(self) -> i32 {
        self as i32
    }
}

impl From<TickPriority> for i32 {
    fn from(priority: TickPriority) -> Self {
        priority.value()
    }
}

/// A stable handle to a scheduled entry.
///
/// Handles are never reused within one queue, so a handle to an entry that
/// already ran or was cancelled simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle(pub(crate) u64);

impl Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick#{}", self.0)
    }
}

/// The sort key of a scheduled entry.
///
/// Field order is the comparison order: due tick, then priority, then the
/// insertion sequence number. The sequence number makes every key unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickOrder {
    /// The absolute game tick when the entry falls due.
    pub trigger_tick: u64,
    /// Signed priority, lower runs first.
    pub priority: i32,
    /// Insertion sequence number.
    pub sub_tick_order: u64,
}

/// A pending scheduled update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEntry<T> {
    /// The handle returned when the entry was scheduled.
    pub handle: EntryHandle,
    /// The handler kind whose scheduled behaviour re-runs (usually a block id).
    pub tick_type: T,
    /// The position of the block.
    pub pos: BlockPos,
    /// The absolute game tick when this should fire.
    pub trigger_tick: u64,
    /// Priority for ordering within the same game tick.
    pub priority: i32,
    /// Sub-tick ordering for entries with the same `trigger_tick` and priority.
    /// Lower values run first.
    pub sub_tick_order: u64,
    /// The cause stamped on the entry when it was scheduled.
    pub cause: Option<CauseFrame>,
}

impl<T> ScheduledEntry<T> {
    /// Returns the sort key of the entry.
    #[must_use]
    pub const fn order(&self) -> TickOrder {
        TickOrder {
            trigger_tick: self.trigger_tick,
            priority: self.priority,
            sub_tick_order: self.sub_tick_order,
        }
    }
}
