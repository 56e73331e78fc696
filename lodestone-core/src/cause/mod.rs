//! Cause tracking.
//!
//! Every mutation that happens during a tick is attributed to the actors that
//! were active when it happened: the block being ticked, the block entity or
//! entity being updated, and the user that indirectly started the chain (the
//! notifier).
//!
//! - [`CauseFrame`] - One layer of attribution
//! - [`CauseStack`] - The nested frames active at a point in the simulation
//! - [`Actor`] - A single attributed actor

mod stack;

pub use stack::CauseStack;

use std::fmt::{self, Display};

use lodestone_utils::{BlockId, BlockPos, EntityId};
use smallvec::SmallVec;
use uuid::Uuid;

/// An actor a mutation can be attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    /// An entity being updated.
    Entity(EntityId),
    /// A block entity being updated.
    BlockEntity(BlockPos),
    /// A block whose behaviour is running.
    Block {
        /// Position of the block.
        pos: BlockPos,
        /// Kind of the block.
        block: BlockId,
    },
    /// The user that indirectly triggered the chain.
    User(Uuid),
}

impl Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "{id}"),
            Self::BlockEntity(pos) => write!(f, "block entity at {pos}"),
            Self::Block { pos, block } => write!(f, "block {block} at {pos}"),
            Self::User(uuid) => write!(f, "user {uuid}"),
        }
    }
}

/// One layer of cause attribution.
///
/// Frames only need to populate the slots they know about; lookups through a
/// [`CauseStack`] fall through to lower frames for empty slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CauseFrame {
    /// The entity currently being updated.
    pub ticking_entity: Option<EntityId>,
    /// The block entity currently being updated.
    pub ticking_block_entity: Option<BlockPos>,
    /// The block whose behaviour is currently running.
    pub ticking_block: Option<(BlockPos, BlockId)>,
    /// The user that indirectly triggered this chain of mutations.
    pub notifier: Option<Uuid>,
}

impl CauseFrame {
    /// A frame for a block behaviour running at `pos`.
    #[must_use]
    pub const fn block(pos: BlockPos, block: BlockId) -> Self {
        Self {
            ticking_entity: None,
            ticking_block_entity: None,
            ticking_block: Some((pos, block)),
            notifier: None,
        }
    }

    /// A frame for the block entity at `pos`.
    #[must_use]
    pub const fn block_entity(pos: BlockPos) -> Self {
        Self {
            ticking_entity: None,
            ticking_block_entity: Some(pos),
            ticking_block: None,
            notifier: None,
        }
    }

    /// A frame for an entity update.
    #[must_use]
    pub const fn entity(id: EntityId) -> Self {
        Self {
            ticking_entity: Some(id),
            ticking_block_entity: None,
            ticking_block: None,
            notifier: None,
        }
    }

    /// A frame carrying only a notifier.
    #[must_use]
    pub const fn notifier(user: Uuid) -> Self {
        Self {
            ticking_entity: None,
            ticking_block_entity: None,
            ticking_block: None,
            notifier: Some(user),
        }
    }

    /// Returns the frame with its notifier replaced.
    #[must_use]
    pub const fn with_notifier(mut self, notifier: Option<Uuid>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Returns true if no slot is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ticking_entity.is_none()
            && self.ticking_block_entity.is_none()
            && self.ticking_block.is_none()
            && self.notifier.is_none()
    }

    /// Fills every empty slot of `self` from `lower`.
    pub fn inherit(&mut self, lower: &CauseFrame) {
        self.ticking_entity = self.ticking_entity.or(lower.ticking_entity);
        self.ticking_block_entity = self.ticking_block_entity.or(lower.ticking_block_entity);
        self.ticking_block = self.ticking_block.or(lower.ticking_block);
        self.notifier = self.notifier.or(lower.notifier);
    }

    /// Returns the populated actors, most specific first.
    #[must_use]
    pub fn actors(&self) -> SmallVec<[Actor; 4]> {
        let mut actors = SmallVec::new();
        if let Some(id) = self.ticking_entity {
            actors.push(Actor::Entity(id));
        }
        if let Some(pos) = self.ticking_block_entity {
            actors.push(Actor::BlockEntity(pos));
        }
        if let Some((pos, block)) = self.ticking_block {
            actors.push(Actor::Block { pos, block });
        }
        if let Some(user) = self.notifier {
            actors.push(Actor::User(user));
        }
        actors
    }
}

impl Display for CauseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<no cause>");
        }
        for (i, actor) in self.actors().iter().enumerate() {
            if i > 0 {
                f.write_str(" <- ")?;
            }
            write!(f, "{actor}")?;
        }
        Ok(())
    }
}
