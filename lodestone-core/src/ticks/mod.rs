//! Scheduled block updates.
//!
//! Blocks schedule their own future updates (a repeater flipping after its
//! delay, a lamp turning off) into a per-world queue. Each tick the driver
//! drains every entry that has become due, in a deterministic order.
//!
//! # Architecture
//!
//! - [`ScheduledEntry`] - A single pending update
//! - [`TickPriority`] - Named priority levels for ordering within one game tick
//! - [`ScheduledUpdateQueue`] - The per-world queue with handle-based removal

mod level_ticks;
mod scheduled_tick;

pub use level_ticks::ScheduledUpdateQueue;
pub use scheduled_tick::{EntryHandle, ScheduledEntry, TickOrder, TickPriority};
