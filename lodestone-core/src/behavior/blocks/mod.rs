//! Built-in redstone blocks.
//!
//! Every block here keeps its powered or lit flag in data bit 0.

mod lamp;
mod lever;
mod repeater;

pub use lamp::LampBlock;
pub use lever::LeverBlock;
pub use repeater::RepeaterBlock;

use std::sync::Arc;

use lodestone_utils::{BlockId, BlockPos, BlockState};

use super::BlockBehaviors;
use crate::world::World;

/// Inert full block.
pub const STONE: BlockId = BlockId(1);
/// Manual power source.
pub const LEVER: BlockId = BlockId(2);
/// Delays a signal travelling towards +x.
pub const REPEATER: BlockId = BlockId(3);
/// Lights up while powered.
pub const LAMP: BlockId = BlockId(4);

/// Data bit holding the powered (or lit) flag.
pub const POWERED: u8 = 0;

pub(crate) fn register(behaviors: &mut BlockBehaviors) {
    behaviors.register(LEVER, Arc::new(LeverBlock));
    behaviors.register(REPEATER, Arc::new(RepeaterBlock));
    behaviors.register(LAMP, Arc::new(LampBlock));
}

/// Returns true if `state`, placed at `from`, sends power into `to`.
#[must_use]
pub fn powers(state: BlockState, from: BlockPos, to: BlockPos) -> bool {
    if !state.flag(POWERED) {
        return false;
    }
    match state.block {
        LEVER => true,
        REPEATER => RepeaterBlock::output(from) == to,
        _ => false,
    }
}

/// Returns true if any neighbour sends power into `pos`.
#[must_use]
pub fn is_receiving_power(world: &World, pos: BlockPos) -> bool {
    pos.neighbors()
        .into_iter()
        .any(|neighbor| powers(world.block_state(neighbor), neighbor, pos))
}
