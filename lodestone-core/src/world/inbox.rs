//! Cross-thread hand-off of world mutations.
//!
//! A world is only ever touched by its simulation thread. Other threads
//! submit [`PendingMutation`]s through a [`MutationSender`]; the driver applies
//! them at the start of the next Scheduling phase.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use lodestone_utils::{BlockId, BlockPos, BlockState};
use uuid::Uuid;

use crate::error::InboxError;

/// A mutation requested from outside the simulation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingMutation {
    /// Replace the block at `pos`.
    SetBlock {
        /// Target position.
        pos: BlockPos,
        /// The new state.
        state: BlockState,
        /// Whether the six neighbours are notified afterwards.
        notify_neighbors: bool,
    },
    /// Schedule an update for `block` at `pos`.
    ScheduleTick {
        /// Target position.
        pos: BlockPos,
        /// The handler kind.
        block: BlockId,
        /// Delay in ticks. Must not be negative.
        delay: i32,
        /// Signed priority, lower runs first.
        priority: i32,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Submission {
    pub notifier: Option<Uuid>,
    pub mutation: PendingMutation,
}

/// A cloneable handle for submitting mutations to a world from any thread.
#[derive(Debug, Clone)]
pub struct MutationSender {
    tx: Sender<Submission>,
}

impl MutationSender {
    /// Submits a mutation, attributed to `notifier` when it is applied.
    ///
    /// Never blocks. Fails if the inbox is full or the world is gone.
    pub fn submit(&self, notifier: Option<Uuid>, mutation: PendingMutation) -> Result<(), InboxError> {
        if let PendingMutation::ScheduleTick { delay, .. } = mutation
            && delay < 0
        {
            return Err(InboxError::NegativeDelay(delay));
        }
        self.tx
            .try_send(Submission { notifier, mutation })
            .map_err(|err| match err {
                TrySendError::Full(_) => InboxError::Full,
                TrySendError::Disconnected(_) => InboxError::Disconnected,
            })
    }
}

#[derive(Debug)]
pub(crate) struct MutationInbox {
    tx: Sender<Submission>,
    rx: Receiver<Submission>,
}

impl MutationInbox {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> MutationSender {
        MutationSender { tx: self.tx.clone() }
    }

    /// Takes the submissions that arrived before the call. Later arrivals wait for the next drain.
    pub fn drain(&self) -> Vec<Submission> {
        let available = self.rx.len();
        self.rx.try_iter().take(available).collect()
    }
}
