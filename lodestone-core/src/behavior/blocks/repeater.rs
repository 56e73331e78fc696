//! Repeater behavior implementation.
//!
//! A repeater reads power from its west side and, after a delay, outputs
//! power to its east side. The flip runs as a high-priority scheduled tick,
//! so it lands before normal-priority updates due on the same tick.

use lodestone_utils::{BlockPos, BlockState};

use super::{POWERED, REPEATER, powers};
use crate::behavior::BlockBehaviour;
use crate::error::SimulationFault;
use crate::ticks::TickPriority;
use crate::world::{TickContext, World};

/// Behavior for repeaters.
pub struct RepeaterBlock;

impl RepeaterBlock {
    /// Ticks between the input changing and the output following it.
    pub const DELAY: i32 = 2;

    /// The unpowered repeater state.
    #[must_use]
    pub const fn state() -> BlockState {
        BlockState::new(REPEATER, 0)
    }

    /// The position a repeater at `pos` reads from.
    #[must_use]
    pub const fn input(pos: BlockPos) -> BlockPos {
        pos.offset(-1, 0, 0)
    }

    /// The position a repeater at `pos` powers.
    #[must_use]
    pub const fn output(pos: BlockPos) -> BlockPos {
        pos.offset(1, 0, 0)
    }

    fn should_be_powered(world: &World, pos: BlockPos) -> bool {
        let input = Self::input(pos);
        powers(world.block_state(input), input, pos)
    }
}

impl BlockBehaviour for RepeaterBlock {
    fn name(&self) -> &'static str {
        "repeater"
    }

    fn tick(&self, ctx: &mut TickContext<'_>, pos: BlockPos, state: BlockState) -> Result<(), SimulationFault> {
        let powered = Self::should_be_powered(ctx.world(), pos);
        if powered == state.flag(POWERED) {
            return Ok(());
        }
        ctx.set_block(pos, state.with_flag(POWERED, powered))?;
        ctx.notify_neighbors(pos)
    }

    fn neighbor_changed(
        &self,
        ctx: &mut TickContext<'_>,
        pos: BlockPos,
        state: BlockState,
        _from: BlockPos,
    ) -> Result<(), SimulationFault> {
        // One pending flip at a time, like vanilla's diode.
        if ctx.scheduled_count(pos) > 0 {
            return Ok(());
        }
        if Self::should_be_powered(ctx.world(), pos) != state.flag(POWERED) {
            ctx.schedule_tick(pos, REPEATER, Self::DELAY, TickPriority::High);
        }
        Ok(())
    }
}
