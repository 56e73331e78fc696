//! The boundary to the external listener system.

use crate::capture::CaptureRecord;
use crate::cause::CauseFrame;

/// The outcome of a captured batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Decision {
    /// Keep every record.
    #[default]
    Approve,
    /// Revert every record.
    Veto,
    /// Keep the records at these indices into the batch and revert the rest.
    PartialApprove(Vec<usize>),
}

/// Decides the fate of a captured batch.
///
/// The gate is called synchronously after the batch's capture session has
/// closed. It must not mutate the world.
pub trait EventGate: Send {
    /// Returns the decision for `batch`, produced under `cause`.
    fn decide(&mut self, cause: &CauseFrame, batch: &[CaptureRecord]) -> Decision;
}

/// A gate that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl EventGate for ApproveAll {
    fn decide(&mut self, _cause: &CauseFrame, _batch: &[CaptureRecord]) -> Decision {
        Decision::Approve
    }
}

impl<F> EventGate for F
where
    F: FnMut(&CauseFrame, &[CaptureRecord]) -> Decision + Send,
{
    fn decide(&mut self, cause: &CauseFrame, batch: &[CaptureRecord]) -> Decision {
        self(cause, batch)
    }
}
