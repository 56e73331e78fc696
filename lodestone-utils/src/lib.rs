//! # Lodestone Utils
//!
//! Small value types shared by every Lodestone crate.

pub mod math;
pub mod types;

pub use types::{BlockId, BlockPos, BlockState, EntityId};
