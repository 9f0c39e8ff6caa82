//! Run narration through `tracing`.

use fanout::scheduler::RunObserver;
use tracing::{debug, info};

/// Logs progress at info level and per-account status at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
	fn on_progress(&self, processed: usize, total: usize) {
		info!(target: "fanout.progress", processed, total, "progress {processed}/{total}");
	}

	fn on_status(&self, account: &str, message: &str) {
		debug!(target: "fanout.status", %account, "{message}");
	}

	fn on_liveness(&self, account: &str, active: bool) {
		info!(target: "fanout.status", %account, active, "{}", if active { "session up" } else { "session down" });
	}
}

#[cfg(test)]
mod tests {
	use std::io;
	use std::sync::Arc;

	use parking_lot::Mutex;
	use tracing_subscriber::EnvFilter;

	use super::*;

	#[derive(Clone, Default)]
	struct Captured(Arc<Mutex<Vec<u8>>>);

	impl io::Write for Captured {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	fn narrate(directives: &str) -> String {
		let captured = Captured::default();
		let writer = captured.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_writer(move || writer.clone())
			.with_env_filter(EnvFilter::new(directives))
			.with_ansi(false)
			.with_target(true)
			.finish();

		tracing::subscriber::with_default(subscriber, || {
			let observer = TracingObserver;
			observer.on_progress(3, 7);
			observer.on_status("alice", "validating reference 1001");
			observer.on_liveness("bob", true);
		});
		let bytes = captured.0.lock().clone();
		String::from_utf8(bytes).unwrap()
	}

	#[test]
	fn events_are_filterable_by_narration_target() {
		let status = narrate("off,fanout.status=debug");
		assert!(status.contains("fanout.status"), "missing status target: {status}");
		assert!(status.contains("validating reference 1001"));
		assert!(status.contains("session up"));
		assert!(!status.contains("progress 3/7"));

		let progress = narrate("off,fanout.progress=info");
		assert!(progress.contains("progress 3/7"));
		assert!(!progress.contains("session up"));
	}
}
