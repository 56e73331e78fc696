//! Block behaviours.
//!
//! A behaviour is the code that runs for a block kind: its scheduled ticks,
//! its reaction to neighbour changes and its block events. Behaviours are
//! stateless and shared; all state lives in the world.

pub mod blocks;

use std::sync::Arc;

use lodestone_utils::{BlockId, BlockPos, BlockState};
use rustc_hash::FxHashMap;

use crate::error::SimulationFault;
use crate::world::TickContext;

/// Logic attached to a block kind.
pub trait BlockBehaviour: Send + Sync {
    /// A short name used in logs and crash reports.
    fn name(&self) -> &'static str;

    /// Runs a scheduled update for the block at `pos`.
    fn tick(&self, _ctx: &mut TickContext<'_>, _pos: BlockPos, _state: BlockState) -> Result<(), SimulationFault> {
        Ok(())
    }

    /// Called when the block at `from` changed next to this one.
    fn neighbor_changed(
        &self,
        _ctx: &mut TickContext<'_>,
        _pos: BlockPos,
        _state: BlockState,
        _from: BlockPos,
    ) -> Result<(), SimulationFault> {
        Ok(())
    }

    /// Delivers a block event queued for this block.
    fn triggered_event(
        &self,
        _ctx: &mut TickContext<'_>,
        _pos: BlockPos,
        _state: BlockState,
        _id: u8,
        _param: i32,
    ) -> Result<(), SimulationFault> {
        Ok(())
    }
}

/// Registry from block kind to behaviour.
#[derive(Default, Clone)]
pub struct BlockBehaviors {
    behaviors: FxHashMap<BlockId, Arc<dyn BlockBehaviour>>,
}

impl BlockBehaviors {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in redstone blocks.
    #[must_use]
    pub fn vanilla() -> Self {
        let mut behaviors = Self::new();
        blocks::register(&mut behaviors);
        behaviors
    }

    /// Registers `behavior` for `block`, replacing any previous one.
    pub fn register(&mut self, block: BlockId, behavior: Arc<dyn BlockBehaviour>) {
        if let Some(previous) = self.behaviors.insert(block, behavior) {
            log::debug!("Replaced behaviour {} for block {block}", previous.name());
        }
    }

    /// Returns the behaviour for `block`.
    #[must_use]
    pub fn get(&self, block: BlockId) -> Option<Arc<dyn BlockBehaviour>> {
        self.behaviors.get(&block).cloned()
    }
}
