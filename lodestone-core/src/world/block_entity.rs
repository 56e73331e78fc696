//! Ticking block entities.

use std::fmt::{self, Display};
use std::mem;

use lodestone_utils::BlockPos;

use super::TickContext;
use crate::error::SimulationFault;

/// A block entity that runs logic every tick.
pub trait BlockEntity: Send {
    /// Advances the block entity by one tick.
    fn tick(&mut self, ctx: &mut TickContext<'_>, pos: BlockPos) -> Result<(), SimulationFault>;

    /// A short type name used in crash reports.
    fn type_name(&self) -> &'static str;
}

/// Identifies one stored block entity for as long as it is kept in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockEntityId(u64);

impl Display for BlockEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block entity #{}", self.0)
    }
}

struct BlockEntityEntry {
    id: BlockEntityId,
    pos: BlockPos,
    brain: Option<Box<dyn BlockEntity>>,
    removed: bool,
}

/// Block entities in registration order.
///
/// At most one entry per position is live. Removed and replaced entries stay
/// in storage, marked, until the next purge, so a removal or replacement can
/// be undone by making the old entry live again. While a pass is running,
/// additions are buffered in `pending` and merged by [`Self::end_pass`].
#[derive(Default)]
pub(crate) struct BlockEntityStorage {
    ticking: Vec<BlockEntityEntry>,
    pending: Vec<BlockEntityEntry>,
    processing: bool,
    next_id: u64,
}

impl BlockEntityStorage {
    /// Stores a block entity without making it live.
    pub fn insert(&mut self, pos: BlockPos, brain: Box<dyn BlockEntity>) -> BlockEntityId {
        let id = BlockEntityId(self.next_id);
        self.next_id += 1;
        let entry = BlockEntityEntry {
            id,
            pos,
            brain: Some(brain),
            removed: true,
        };
        if self.processing {
            self.pending.push(entry);
        } else {
            self.ticking.push(entry);
        }
        id
    }

    /// Adds a block entity, replacing any other one at the same position.
    pub fn add(&mut self, pos: BlockPos, brain: Box<dyn BlockEntity>) -> BlockEntityId {
        let id = self.insert(pos, brain);
        self.set_live(pos, Some(id));
        id
    }

    /// The live block entity at `pos`.
    pub fn live_at(&self, pos: BlockPos) -> Option<BlockEntityId> {
        self.ticking
            .iter()
            .chain(&self.pending)
            .find(|entry| entry.pos == pos && !entry.removed)
            .map(|entry| entry.id)
    }

    /// Makes `id` the live block entity at `pos`, or leaves none when `id` is `None`.
    ///
    /// Returns false, changing nothing, if `id` is not stored at `pos`.
    pub fn set_live(&mut self, pos: BlockPos, id: Option<BlockEntityId>) -> bool {
        if let Some(id) = id
            && !self
                .ticking
                .iter()
                .chain(&self.pending)
                .any(|entry| entry.id == id && entry.pos == pos)
        {
            return false;
        }
        for entry in self
            .ticking
            .iter_mut()
            .chain(self.pending.iter_mut())
            .filter(|entry| entry.pos == pos)
        {
            entry.removed = Some(entry.id) != id;
        }
        true
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.live_at(pos).is_some()
    }

    /// Purges removed entries and starts buffering additions. Returns the number of entries to tick.
    pub fn begin_pass(&mut self) -> usize {
        self.purge();
        self.processing = true;
        self.ticking.len()
    }

    /// Takes the block entity at `index` out for ticking, unless it was removed.
    pub fn take(&mut self, index: usize) -> Option<(BlockPos, Box<dyn BlockEntity>)> {
        let entry = self.ticking.get_mut(index)?;
        if entry.removed {
            return None;
        }
        let brain = entry.brain.take()?;
        Some((entry.pos, brain))
    }

    pub fn restore(&mut self, index: usize, brain: Box<dyn BlockEntity>) {
        if let Some(entry) = self.ticking.get_mut(index) {
            entry.brain = Some(brain);
        }
    }

    /// Stops buffering, purges removed entries and merges the buffered additions.
    pub fn end_pass(&mut self) {
        self.processing = false;
        self.purge();
        let pending = mem::take(&mut self.pending);
        self.ticking
            .extend(pending.into_iter().filter(|entry| !entry.removed));
    }

    /// Number of stored entries, including ones waiting to be merged or purged.
    pub fn len(&self) -> usize {
        self.ticking.len() + self.pending.len()
    }

    fn purge(&mut self) {
        self.ticking.retain(|entry| !entry.removed);
    }
}
