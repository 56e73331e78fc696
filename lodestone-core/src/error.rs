//! Error types shared across the simulation core.

use std::any::Any;

use thiserror::Error;

/// A failure raised by simulation code while a unit of work was running.
///
/// Faults are recovered at the unit boundary: the unit's captured changes are
/// rolled back and a [`CrashReport`](crate::driver::CrashReport) is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationFault {
    /// A handler reported a failure.
    #[error("{0}")]
    Handler(String),
    /// A handler panicked.
    #[error("panicked: {0}")]
    Panicked(String),
    /// A mutation was requested that the world cannot represent.
    #[error("invalid state for {target}: {reason}")]
    InvalidState {
        /// The mutation target.
        target: String,
        /// Why the mutation was rejected.
        reason: &'static str,
    },
}

impl SimulationFault {
    /// Creates a handler fault from any displayable message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Converts a caught panic payload into a fault.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_owned()
        };
        Self::Panicked(message)
    }
}

/// Errors returned when handing a mutation to a world from another thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboxError {
    /// The inbox is at capacity; the world is not keeping up.
    #[error("mutation inbox is full")]
    Full,
    /// The world owning the inbox has been dropped.
    #[error("mutation inbox is disconnected")]
    Disconnected,
    /// A scheduled tick was submitted with a negative delay.
    #[error("negative tick delay {0}")]
    NegativeDelay(i32),
}
