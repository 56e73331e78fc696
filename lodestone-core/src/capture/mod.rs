//! Transactional capture of world mutations.
//!
//! While a capture session is open every block, entity and block entity mutation routed
//! through [`TickContext::apply_mutation`](crate::world::TickContext::apply_mutation)
//! is recorded with its prior state, its new state and the cause active when
//! it happened. The outermost close hands the whole batch to the event gate,
//! whose decision is then applied.

mod session;

pub use session::CaptureSession;

use std::fmt::{self, Display};

use lodestone_utils::{BlockPos, BlockState, EntityId};

use crate::cause::CauseFrame;
use crate::world::{BlockEntityId, EntitySnapshot};

/// The identity of something a mutation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    /// A block position.
    Block(BlockPos),
    /// An entity.
    Entity(EntityId),
    /// The block entity slot at a position.
    BlockEntity(BlockPos),
}

impl Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(pos) => write!(f, "block at {pos}"),
            Self::Entity(id) => write!(f, "{id}"),
            Self::BlockEntity(pos) => write!(f, "block entity at {pos}"),
        }
    }
}

/// The state of a [`CaptureTarget`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapturedState {
    /// A block state. Air stands for "no block".
    Block(BlockState),
    /// An entity state. `None` means the entity does not exist.
    Entity(Option<EntitySnapshot>),
    /// The live block entity in a slot. `None` means the slot is empty.
    BlockEntity(Option<BlockEntityId>),
}

impl CapturedState {
    /// Returns true if the state kind matches the target kind.
    #[must_use]
    pub const fn fits(&self, target: &CaptureTarget) -> bool {
        matches!(
            (self, target),
            (Self::Block(_), CaptureTarget::Block(_))
                | (Self::Entity(_), CaptureTarget::Entity(_))
                | (Self::BlockEntity(_), CaptureTarget::BlockEntity(_))
        )
    }

    /// Returns the state with every representation of "no block" folded into plain air.
    #[must_use]
    pub const fn normalized(self) -> Self {
        match self {
            Self::Block(state) => Self::Block(state.normalized()),
            other => other,
        }
    }
}

impl Display for CapturedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(state) => write!(f, "{state}"),
            Self::Entity(Some(snapshot)) => write!(f, "{snapshot}"),
            Self::Entity(None) | Self::BlockEntity(None) => f.write_str("<absent>"),
            Self::BlockEntity(Some(id)) => write!(f, "{id}"),
        }
    }
}

/// One captured mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    /// What was changed.
    pub target: CaptureTarget,
    /// The state before the mutation.
    pub before: CapturedState,
    /// The proposed new state.
    pub after: CapturedState,
    /// The cause active when the mutation happened.
    pub cause: CauseFrame,
}

impl Display for CaptureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.target, self.before, self.after, self.cause
        )
    }
}
