use std::collections::VecDeque;

use lodestone_utils::{BlockId, BlockPos};
use uuid::Uuid;

/// A block event waiting to be delivered (a piston extending, a note playing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    /// Where the event fires.
    pub pos: BlockPos,
    /// The block the event was queued for. Delivery is skipped if the block has changed.
    pub block: BlockId,
    /// Behaviour specific event id.
    pub id: u8,
    /// Behaviour specific parameter.
    pub param: i32,
    /// The user active when the event was queued.
    pub notifier: Option<Uuid>,
}

// FIFO of block events queued during the tick. Duplicate events are dropped like vanilla does.
#[derive(Debug, Default)]
pub(crate) struct BlockEventQueue {
    events: VecDeque<BlockEvent>,
}

impl BlockEventQueue {
    pub fn push(&mut self, event: BlockEvent) -> bool {
        let duplicate = self.events.iter().any(|queued| {
            queued.pos == event.pos
                && queued.block == event.block
                && queued.id == event.id
                && queued.param == event.param
        });
        if duplicate {
            return false;
        }
        self.events.push_back(event);
        true
    }

    /// Takes every event queued so far, leaving later pushes for the next round.
    pub fn take_round(&mut self, max: usize) -> Vec<BlockEvent> {
        let n = self.events.len().min(max);
        self.events.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
