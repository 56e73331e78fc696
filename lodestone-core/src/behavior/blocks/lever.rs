//! Lever behavior implementation.

use lodestone_utils::{BlockPos, BlockState};

use super::{LEVER, POWERED};
use crate::behavior::BlockBehaviour;
use crate::error::SimulationFault;
use crate::world::TickContext;

/// A manual power source. Toggling it powers every neighbour.
pub struct LeverBlock;

impl LeverBlock {
    /// Block event id that flips the lever.
    pub const TOGGLE_EVENT: u8 = 0;

    /// The lever state with the given power.
    #[must_use]
    pub const fn state(powered: bool) -> BlockState {
        BlockState::new(LEVER, 0).with_flag(POWERED, powered)
    }

    /// Flips the lever at `pos` and notifies its neighbours.
    pub fn toggle(ctx: &mut TickContext<'_>, pos: BlockPos) -> Result<bool, SimulationFault> {
        let state = ctx.block_state(pos);
        if state.block != LEVER {
            return Err(SimulationFault::InvalidState {
                target: pos.to_string(),
                reason: "not a lever",
            });
        }
        let powered = !state.flag(POWERED);
        ctx.set_block(pos, state.with_flag(POWERED, powered))?;
        ctx.notify_neighbors(pos)?;
        log::debug!("Lever at {pos} switched {}", if powered { "on" } else { "off" });
        Ok(powered)
    }
}

impl BlockBehaviour for LeverBlock {
    fn name(&self) -> &'static str {
        "lever"
    }

    fn triggered_event(
        &self,
        ctx: &mut TickContext<'_>,
        pos: BlockPos,
        _state: BlockState,
        id: u8,
        _param: i32,
    ) -> Result<(), SimulationFault> {
        if id == Self::TOGGLE_EVENT {
            Self::toggle(ctx, pos)?;
        }
        Ok(())
    }
}
