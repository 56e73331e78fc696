//! The stack of active cause frames.

use std::panic::{self, AssertUnwindSafe};

use lodestone_utils::{BlockId, BlockPos, EntityId};
use uuid::Uuid;

use super::{Actor, CauseFrame};

/// The nested cause frames active at the current point of a tick.
///
/// Frames are pushed and popped in strict LIFO order by the tick driver and by
/// scoped calls on [`TickContext`](crate::world::TickContext). Slot lookups scan
/// from the top of the stack down, so inner frames shadow outer ones without
/// having to repopulate every slot.
///
/// The stack must be back at depth 0 at the end of every tick.
#[derive(Debug, Default)]
pub struct CauseStack {
    frames: Vec<CauseFrame>,
}

impl CauseStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Returns the number of frames on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pushes a frame and returns the depth before the push.
    ///
    /// The returned depth can be handed to [`Self::pop_to`] to restore the stack.
    pub fn push(&mut self, frame: CauseFrame) -> usize {
        let depth = self.frames.len();
        self.frames.push(frame);
        depth
    }

    /// Pops the top frame.
    ///
    /// # Panics
    /// Panics if the stack is empty.
    pub fn pop(&mut self) -> CauseFrame {
        self.frames
            .pop()
            .expect("cause stack popped without a matching push")
    }

    /// Pops frames until the stack is back at `depth`, returning how many were popped.
    ///
    /// # Panics
    /// Panics if the stack is already shallower than `depth`.
    pub fn pop_to(&mut self, depth: usize) -> usize {
        assert!(
            depth <= self.frames.len(),
            "cause stack is at depth {} but was expected to be at least {depth}",
            self.frames.len()
        );
        let popped = self.frames.len() - depth;
        self.frames.truncate(depth);
        popped
    }

    /// Runs `body` with `frame` pushed, popping it on every exit path.
    ///
    /// If `body` panics the frame is popped before the panic continues.
    pub fn with_cause<R>(&mut self, frame: CauseFrame, body: impl FnOnce(&mut Self) -> R) -> R {
        let depth = self.push(frame);
        let result = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.pop_to(depth);
        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Returns a merged snapshot of the stack.
    ///
    /// Each slot holds the value of the topmost frame that populates it.
    #[must_use]
    pub fn current(&self) -> CauseFrame {
        let mut merged = CauseFrame::default();
        for frame in self.frames.iter().rev() {
            merged.inherit(frame);
        }
        merged
    }

    /// Returns the ordered list of actors responsible for the current point, most specific first.
    ///
    /// Every populated slot of every frame is listed once, innermost frame first.
    #[must_use]
    pub fn current_cause(&self) -> Vec<Actor> {
        let mut actors = Vec::new();
        for frame in self.frames.iter().rev() {
            for actor in frame.actors() {
                if !actors.contains(&actor) {
                    actors.push(actor);
                }
            }
        }
        actors
    }

    /// Returns true if any frame carries a notifier.
    #[must_use]
    pub fn has_notifier(&self) -> bool {
        self.frames.iter().any(|frame| frame.notifier.is_some())
    }

    /// Returns the innermost notifier.
    #[must_use]
    pub fn current_notifier(&self) -> Option<Uuid> {
        self.frames.iter().rev().find_map(|frame| frame.notifier)
    }

    /// Returns the innermost ticking block.
    #[must_use]
    pub fn ticking_block(&self) -> Option<(BlockPos, BlockId)> {
        self.frames.iter().rev().find_map(|frame| frame.ticking_block)
    }

    /// Returns the innermost ticking block entity.
    #[must_use]
    pub fn ticking_block_entity(&self) -> Option<BlockPos> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.ticking_block_entity)
    }

    /// Returns the innermost ticking entity.
    #[must_use]
    pub fn ticking_entity(&self) -> Option<EntityId> {
        self.frames.iter().rev().find_map(|frame| frame.ticking_entity)
    }

    /// Resets the stack at a tick boundary.
    ///
    /// # Panics
    /// Panics if frames are still on the stack.
    pub fn end_tick(&mut self) {
        assert!(
            self.frames.is_empty(),
            "cause stack still holds {} frame(s) at the end of the tick: {:?}",
            self.frames.len(),
            self.frames
        );
        self.frames.clear();
    }
}
