use std::mem;

use super::{CaptureRecord, CaptureTarget, CapturedState};
use crate::cause::CauseFrame;

/// A re-entrant capture buffer.
///
/// Nested opens share one flat record sequence; only the outermost close
/// returns it. Records are dropped while the session is closed or while an
/// explicit ignore scope is active, in which case the caller applies the
/// mutation directly.
#[derive(Debug, Default)]
pub struct CaptureSession {
    records: Vec<CaptureRecord>,
    depth: u32,
    ignoring: u32,
}

impl CaptureSession {
    /// Creates a closed session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            depth: 0,
            ignoring: 0,
        }
    }

    /// Opens the session (or one more nesting level of it) and returns the new depth.
    pub fn open(&mut self) -> u32 {
        if self.depth == 0 {
            self.records.clear();
        }
        self.depth += 1;
        self.depth
    }

    /// Records a mutation. Returns false if the session is not capturing.
    pub fn record(
        &mut self,
        target: CaptureTarget,
        before: CapturedState,
        after: CapturedState,
        cause: CauseFrame,
    ) -> bool {
        if !self.is_capturing() {
            return false;
        }
        self.records.push(CaptureRecord {
            target,
            before,
            after,
            cause,
        });
        true
    }

    /// Closes one nesting level.
    ///
    /// The outermost close returns the batch and resets the session; inner
    /// closes return `None`.
    ///
    /// # Panics
    /// Panics if the session is not open.
    pub fn close(&mut self) -> Option<Vec<CaptureRecord>> {
        assert!(self.depth > 0, "capture session closed without a matching open");
        self.depth -= 1;
        (self.depth == 0).then(|| mem::take(&mut self.records))
    }

    /// Closes every nesting level at once and returns whatever was recorded.
    ///
    /// Used when a unit faults and its scopes could not unwind normally.
    pub fn force_close(&mut self) -> Vec<CaptureRecord> {
        if self.depth > 0 {
            log::debug!("Force closing capture session at depth {}", self.depth);
        }
        self.depth = 0;
        self.ignoring = 0;
        mem::take(&mut self.records)
    }

    /// Returns true if mutations are currently being recorded.
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.depth > 0 && self.ignoring == 0
    }

    /// Returns true if the session is open, whether or not it is ignoring.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.depth > 0
    }

    /// The current nesting depth.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Enters an ignore scope. Mutations are applied without being recorded
    /// until the matching [`Self::end_ignoring`].
    pub fn begin_ignoring(&mut self) {
        self.ignoring += 1;
    }

    /// Leaves an ignore scope.
    ///
    /// # Panics
    /// Panics if no ignore scope is active.
    pub fn end_ignoring(&mut self) {
        assert!(self.ignoring > 0, "end_ignoring called without begin_ignoring");
        self.ignoring -= 1;
    }

    /// Returns true if an ignore scope is active.
    #[must_use]
    pub const fn is_ignoring(&self) -> bool {
        self.ignoring > 0
    }
}
