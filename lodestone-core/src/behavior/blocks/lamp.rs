//! Lamp behavior implementation.

use lodestone_utils::{BlockPos, BlockState};

use super::{LAMP, POWERED, is_receiving_power};
use crate::behavior::BlockBehaviour;
use crate::error::SimulationFault;
use crate::ticks::TickPriority;
use crate::world::TickContext;

/// Lights instantly when powered and goes dark a few ticks after losing power.
pub struct LampBlock;

impl LampBlock {
    /// Ticks a lamp stays lit after losing power.
    pub const OFF_DELAY: i32 = 4;

    /// The unlit lamp state.
    #[must_use]
    pub const fn state() -> BlockState {
        BlockState::new(LAMP, 0)
    }
}

impl BlockBehaviour for LampBlock {
    fn name(&self) -> &'static str {
        "lamp"
    }

    fn tick(&self, ctx: &mut TickContext<'_>, pos: BlockPos, state: BlockState) -> Result<(), SimulationFault> {
        if state.flag(POWERED) && !is_receiving_power(ctx.world(), pos) {
            ctx.set_block(pos, state.with_flag(POWERED, false))?;
        }
        Ok(())
    }

    fn neighbor_changed(
        &self,
        ctx: &mut TickContext<'_>,
        pos: BlockPos,
        state: BlockState,
        _from: BlockPos,
    ) -> Result<(), SimulationFault> {
        let lit = state.flag(POWERED);
        let powered = is_receiving_power(ctx.world(), pos);

        if powered && !lit {
            ctx.set_block(pos, state.with_flag(POWERED, true))?;
        } else if !powered && lit && ctx.scheduled_count(pos) == 0 {
            ctx.schedule_tick(pos, LAMP, Self::OFF_DELAY, TickPriority::Normal);
        }
        Ok(())
    }
}
