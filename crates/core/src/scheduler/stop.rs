//! Cooperative stop flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop request, checked between discrete steps.
///
/// Raising it never interrupts an interaction in progress; workers finish
/// their current item and then exit.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn stop(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_stopped(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clones_share_the_flag() {
		let signal = StopSignal::new();
		let other = signal.clone();
		assert!(!other.is_stopped());
		signal.stop();
		assert!(other.is_stopped());
	}
}
