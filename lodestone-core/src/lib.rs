//! # Lodestone Core
//!
//! The tick engine of a block world: a deterministic scheduled update queue,
//! a cause stack that attributes every mutation to the actors behind it, and
//! a re-entrant capture session that lets an [`EventGate`](gate::EventGate)
//! approve, veto or partially approve each batch of changes before it becomes
//! permanent.
//!
//! # Architecture
//!
//! - [`ticks`] - Scheduled updates ordered by (due tick, priority, sequence)
//! - [`cause`] - Cause frames and the per-world cause stack
//! - [`capture`] - Before/after records of world mutations
//! - [`gate`] - The decision boundary for captured batches
//! - [`world`] - World state and the [`TickContext`](world::TickContext) handle
//! - [`driver`] - Runs the phases of a tick and recovers from faults
//! - [`behavior`] - Block behaviours, including a few redstone blocks
//!
//! # Example
//!
//! ```ignore
//! use lodestone_core::behavior::BlockBehaviors;
//! use lodestone_core::config::TickConfig;
//! use lodestone_core::driver::TickDriver;
//!
//! let mut driver = TickDriver::new(TickConfig::default(), BlockBehaviors::vanilla());
//! let summary = driver.tick();
//! log::info!("{summary}");
//! ```

pub mod behavior;
pub mod capture;
pub mod cause;
pub mod config;
pub mod driver;
pub mod error;
pub mod gate;
pub mod ticks;
pub mod world;

pub use driver::{TickDriver, TickSummary};
pub use error::SimulationFault;
