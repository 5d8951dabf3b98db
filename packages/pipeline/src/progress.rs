//! Progress reporting trait for enrichment runs.
//!
//! Decouples the pipeline from any rendering backend. The CLI supplies an
//! `indicatif` bar; tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running pipeline.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// concurrently resolving tasks.
pub trait ProgressCallback: Send + Sync {
    /// Number of observations the run will account for.
    fn set_total(&self, total: u64);

    /// `delta` more observations have been accounted for.
    fn inc(&self, delta: u64);

    /// Replaces the status text.
    fn set_message(&self, msg: String);

    /// The run is over; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
