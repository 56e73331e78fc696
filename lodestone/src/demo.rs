//! The demo circuit: a lever driving a lamp through a chain of repeaters.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lodestone_core::behavior::blocks::{LampBlock, LeverBlock, POWERED, RepeaterBlock};
use lodestone_core::world::{MutationSender, PendingMutation, World};
use lodestone_utils::BlockPos;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const REPEATERS: i32 = 3;

/// Positions of the interesting blocks of the circuit.
pub struct Circuit {
    /// The lever the operator thread flips.
    pub lever: BlockPos,
    /// The lamp at the end of the repeater chain.
    pub lamp: BlockPos,
}

impl Circuit {
    /// Places the circuit along +x starting at `origin`.
    pub fn build(world: &mut World, origin: BlockPos) -> Self {
        let lever = origin;
        world.set_block(lever, LeverBlock::state(false));
        for i in 1..=REPEATERS {
            world.set_block(origin.offset(i, 0, 0), RepeaterBlock::state());
        }
        let lamp = origin.offset(REPEATERS + 1, 0, 0);
        world.set_block(lamp, LampBlock::state());

        log::info!("Built demo circuit from {lever} to {lamp}");
        Self { lever, lamp }
    }

    /// Returns true while the lamp is powered.
    pub fn lamp_lit(&self, world: &World) -> bool {
        world.block_state(self.lamp).flag(POWERED)
    }

    /// Flips the lever every `period` from a separate thread until `cancel_token` fires.
    pub fn spawn_toggler(
        &self,
        sender: MutationSender,
        cancel_token: CancellationToken,
        period: Duration,
    ) -> io::Result<JoinHandle<()>> {
        let lever = self.lever;
        let operator = Uuid::new_v4();
        log::info!("Lever operator is {operator}");

        thread::Builder::new()
            .name("lever-operator".to_owned())
            .spawn(move || {
                let mut powered = false;
                loop {
                    thread::sleep(period);
                    if cancel_token.is_cancelled() {
                        break;
                    }
                    let mutation = PendingMutation::SetBlock {
                        pos: lever,
                        state: LeverBlock::state(!powered),
                        notify_neighbors: true,
                    };
                    match sender.submit(Some(operator), mutation) {
                        Ok(()) => powered = !powered,
                        Err(err) => log::warn!("Failed to flip lever at {lever}: {err}"),
                    }
                }
            })
    }
}
