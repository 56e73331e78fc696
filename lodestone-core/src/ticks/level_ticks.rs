//! World-level scheduled update queue.

use std::collections::BTreeMap;

use lodestone_utils::BlockPos;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{EntryHandle, ScheduledEntry, TickOrder};
use crate::cause::CauseFrame;

/// The scheduled update queue of one world.
///
/// # Architecture
///
/// - `ordered` holds every pending entry sorted by its [`TickOrder`], so the
///   next entry to run is always the first key
/// - `orders` maps a handle to its current sort key for cancellation and
///   re-prioritisation
/// - `positions` indexes handles by block position for the per-position
///   queries
///
/// Unlike vanilla's per-chunk tick lists there is no deduplication: several
/// entries for the same position and handler are independent.
#[derive(Debug)]
pub struct ScheduledUpdateQueue<T> {
    ordered: BTreeMap<TickOrder, ScheduledEntry<T>>,
    orders: FxHashMap<EntryHandle, TickOrder>,
    positions: FxHashMap<BlockPos, SmallVec<[EntryHandle; 2]>>,
    /// Counter for generating unique sub-tick order values. Doubles as the handle id.
    sub_tick_counter: u64,
    current_tick: u64,
}

impl<T: Copy> ScheduledUpdateQueue<T> {
    /// Creates an empty queue positioned at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ordered: BTreeMap::new(),
            orders: FxHashMap::default(),
            positions: FxHashMap::default(),
            sub_tick_counter: 0,
            current_tick: 0,
        }
    }

    /// The tick new entries are scheduled relative to.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Moves the queue's notion of "now" forward. Never moves it backwards.
    pub fn advance_to(&mut self, tick: u64) {
        self.current_tick = self.current_tick.max(tick);
    }

    /// Schedules an update at `pos`, due `delay` ticks after the current tick.
    ///
    /// An entry scheduled with delay 0 while a drain is running is never part
    /// of that drain; it is eligible from the next drain on.
    ///
    /// # Panics
    /// Panics if `delay` is negative.
    pub fn schedule(&mut self, pos: BlockPos, tick_type: T, delay: i32, priority: i32) -> EntryHandle {
        assert!(delay >= 0, "scheduled tick at {pos} with negative delay {delay}");

        let sub_tick_order = self.sub_tick_counter;
        self.sub_tick_counter += 1;

        let handle = EntryHandle(sub_tick_order);
        let entry = ScheduledEntry {
            handle,
            tick_type,
            pos,
            trigger_tick: self.current_tick + u64::from(delay.unsigned_abs()),
            priority,
            sub_tick_order,
            cause: None,
        };

        let order = entry.order();
        self.ordered.insert(order, entry);
        self.orders.insert(handle, order);
        self.positions.entry(pos).or_default().push(handle);
        handle
    }

    /// Removes and returns every entry due at or before `current_tick`, in
    /// ascending (due tick, priority, sequence) order.
    pub fn drain_due(&mut self, current_tick: u64) -> Vec<ScheduledEntry<T>> {
        self.drain_due_limited(current_tick, usize::MAX)
    }

    /// Like [`Self::drain_due`] but returns at most `max_ticks` entries.
    ///
    /// Entries left over stay queued with their original ordering and run first
    /// on the next drain.
    pub fn drain_due_limited(&mut self, current_tick: u64, max_ticks: usize) -> Vec<ScheduledEntry<T>> {
        self.advance_to(current_tick);

        let mut drained = Vec::new();
        while drained.len() < max_ticks {
            match self.ordered.first_key_value() {
                Some((order, _)) if order.trigger_tick <= current_tick => {}
                _ => break,
            }
            let Some((_, entry)) = self.ordered.pop_first() else {
                break;
            };
            self.forget(&entry);
            drained.push(entry);
        }

        if !drained.is_empty() {
            log::trace!(
                "Drained {} scheduled tick(s) at tick {current_tick}, {} still pending",
                drained.len(),
                self.ordered.len()
            );
        }
        drained
    }

    /// Cancels a pending entry.
    ///
    /// Returns `false` if the entry already ran or was already cancelled.
    pub fn cancel(&mut self, handle: EntryHandle) -> bool {
        self.take(handle).is_some()
    }

    /// Removes a pending entry and hands it back, so it can be [`restored`](Self::restore) later.
    pub fn take(&mut self, handle: EntryHandle) -> Option<ScheduledEntry<T>> {
        let order = self.orders.get(&handle).copied()?;
        let entry = self.ordered.remove(&order)?;
        self.forget(&entry);
        Some(entry)
    }

    /// Puts back an entry removed by [`Self::take`], with its original handle and ordering.
    ///
    /// Returns `false` if an entry with that handle is already pending.
    pub fn restore(&mut self, entry: ScheduledEntry<T>) -> bool {
        if self.orders.contains_key(&entry.handle) {
            return false;
        }
        let order = entry.order();
        self.orders.insert(entry.handle, order);
        self.positions.entry(entry.pos).or_default().push(entry.handle);
        self.ordered.insert(order, entry);
        true
    }

    /// Changes the priority of a pending entry, re-sorting it.
    ///
    /// The entry keeps its due tick and insertion sequence number. Returns
    /// `false` if the entry is no longer pending.
    pub fn set_priority(&mut self, handle: EntryHandle, priority: i32) -> bool {
        let Some(order) = self.orders.get(&handle).copied() else {
            return false;
        };
        let Some(mut entry) = self.ordered.remove(&order) else {
            return false;
        };
        entry.priority = priority;
        let order = entry.order();
        self.ordered.insert(order, entry);
        self.orders.insert(handle, order);
        true
    }

    /// Stamps a cause onto a pending entry.
    ///
    /// A stamp that already carries a notifier is kept as is. Returns whether the
    /// stamp was applied.
    pub fn attach_cause(&mut self, handle: EntryHandle, cause: CauseFrame) -> bool {
        let Some(entry) = self.get_mut(handle) else {
            return false;
        };
        if entry.cause.is_some_and(|stamped| stamped.notifier.is_some()) {
            return false;
        }
        entry.cause = Some(cause);
        true
    }

    /// Returns a pending entry.
    #[must_use]
    pub fn get(&self, handle: EntryHandle) -> Option<&ScheduledEntry<T>> {
        let order = self.orders.get(&handle)?;
        self.ordered.get(order)
    }

    fn get_mut(&mut self, handle: EntryHandle) -> Option<&mut ScheduledEntry<T>> {
        let order = self.orders.get(&handle)?;
        self.ordered.get_mut(order)
    }

    /// Returns the pending entries at `pos`, in the order they will run.
    #[must_use]
    pub fn scheduled_at(&self, pos: BlockPos) -> Vec<&ScheduledEntry<T>> {
        let Some(handles) = self.positions.get(&pos) else {
            return Vec::new();
        };
        let mut entries: Vec<_> = handles.iter().filter_map(|handle| self.get(*handle)).collect();
        entries.sort_by_key(|entry| entry.order());
        entries
    }

    /// Returns how many entries are pending at `pos`.
    #[must_use]
    pub fn count_at(&self, pos: BlockPos) -> usize {
        self.positions.get(&pos).map_or(0, SmallVec::len)
    }

    /// Returns the total number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    fn forget(&mut self, entry: &ScheduledEntry<T>) {
        self.orders.remove(&entry.handle);
        if let Some(handles) = self.positions.get_mut(&entry.pos) {
            handles.retain(|handle| *handle != entry.handle);
            if handles.is_empty() {
                self.positions.remove(&entry.pos);
            }
        }
    }
}

impl<T: Copy> Default for ScheduledUpdateQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
