//! Run progress callbacks.

/// Receives run narration. Every method defaults to a no-op.
///
/// Callbacks run on worker tasks and must return quickly.
pub trait RunObserver: Send + Sync {
	/// `processed` items finished out of `total` queued at start.
	fn on_progress(&self, _processed: usize, _total: usize) {}

	fn on_status(&self, _account: &str, _message: &str) {}

	/// Whether `account` currently holds a live session.
	fn on_liveness(&self, _account: &str, _active: bool) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
