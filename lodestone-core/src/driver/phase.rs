use std::fmt::{self, Display};

/// The phases of one tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TickPhase {
    /// Inbox mutations are applied, then due scheduled updates run.
    Scheduling,
    /// Every entity ticks once.
    EntityPass,
    /// Every block entity ticks once.
    TileEntityPass,
    /// Queued block events are delivered.
    BlockEventFlush,
    /// Between ticks.
    #[default]
    Idle,
}

impl TickPhase {
    /// The phase that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Scheduling => Self::EntityPass,
            Self::EntityPass => Self::TileEntityPass,
            Self::TileEntityPass => Self::BlockEventFlush,
            Self::BlockEventFlush => Self::Idle,
            Self::Idle => Self::Scheduling,
        }
    }
}

impl Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduling => "scheduling",
            Self::EntityPass => "entity pass",
            Self::TileEntityPass => "tile entity pass",
            Self::BlockEventFlush => "block event flush",
            Self::Idle => "idle",
        })
    }
}
