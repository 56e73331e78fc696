//! # Lodestone
//!
//! Headless runner: loads `lodestone_config.json5`, builds the demo circuit
//! and ticks it at the configured rate until the tick limit given as the
//! first argument is reached or Ctrl-C is pressed.

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use lodestone_core::behavior::BlockBehaviors;
use lodestone_core::config::TickConfig;
use lodestone_core::driver::TickDriver;
use lodestone_utils::BlockPos;
use tokio::time::{self, MissedTickBehavior};
use tokio::{select, signal, spawn};
use tokio_util::sync::CancellationToken;

mod demo;
mod logger;

const CONFIG_PATH: &str = "lodestone_config.json5";
const TOGGLE_PERIOD: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init()?;

    let max_ticks = env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()
        .context("tick limit must be a non-negative integer")?;
    let config = TickConfig::load_or_create(Path::new(CONFIG_PATH))
        .with_context(|| format!("failed to load {CONFIG_PATH}"))?;
    log::info!("Starting Lodestone at {} ticks per second", config.tick_rate);

    let cancel_token = CancellationToken::new();
    let mut driver = TickDriver::new(config.clone(), BlockBehaviors::vanilla());
    let circuit = demo::Circuit::build(driver.world_mut(), BlockPos::new(0, 64, 0));
    let toggler = circuit.spawn_toggler(driver.world().inbox(), cancel_token.clone(), TOGGLE_PERIOD)?;

    let ctrl_c_token = cancel_token.clone();
    spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            log::info!("Received Ctrl-C, stopping");
            ctrl_c_token.cancel();
        }
    });

    let mut interval = time::interval(Duration::from_secs_f64(1.0 / config.tick_rate));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut lamp_lit = circuit.lamp_lit(driver.world());

    loop {
        select! {
            () = cancel_token.cancelled() => {
                break;
            }
            _ = interval.tick() => {
                let summary = driver.tick();
                if summary.committed + summary.vetoed + summary.crashes.len() > 0 {
                    log::info!("{summary}");
                } else {
                    log::trace!("{summary}");
                }

                let lit = circuit.lamp_lit(driver.world());
                if lit != lamp_lit {
                    lamp_lit = lit;
                    log::info!("Lamp at {} is now {}", circuit.lamp, if lit { "lit" } else { "off" });
                }

                if max_ticks.is_some_and(|max| driver.game_time() >= max) {
                    log::info!("Reached tick limit");
                    break;
                }
            }
        }
    }

    cancel_token.cancel();
    toggler
        .join()
        .map_err(|_| anyhow!("lever operator thread panicked"))?;
    log::info!("Stopped after {} ticks", driver.game_time());
    Ok(())
}
