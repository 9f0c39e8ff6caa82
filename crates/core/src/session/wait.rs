//! Bounded polling for page and element state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::handle::{AutomationSession, ElementRef, Locator};
use crate::error::{FanoutError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls `condition` until it yields a value or `timeout` elapses.
///
/// `Ok(None)` and [`FanoutError::ElementNotFound`] keep polling; any other
/// error ends the wait immediately.
pub async fn wait_until<T, F, Fut>(what: &str, timeout: Duration, mut condition: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>>>,
{
	let deadline = Instant::now() + timeout;
	loop {
		match condition().await {
			Ok(Some(value)) => return Ok(value),
			Ok(None) | Err(FanoutError::ElementNotFound(_)) => {}
			Err(err) => return Err(err),
		}

		let now = Instant::now();
		if now >= deadline {
			return Err(FanoutError::ElementTimeout {
				what: what.to_string(),
				timeout_secs: timeout.as_secs(),
			});
		}
		tokio::time::sleep(DEFAULT_POLL_INTERVAL.min(deadline - now)).await;
	}
}

/// Waits for the first element matching `selector`.
pub async fn wait_for_element(session: &dyn AutomationSession, locator: Locator, selector: &str, timeout: Duration) -> Result<ElementRef> {
	wait_until(selector, timeout, || async move { Ok(session.find_elements(locator, selector).await?.into_iter().next()) }).await
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[tokio::test(start_paused = true)]
	async fn returns_once_condition_holds() {
		let calls = AtomicUsize::new(0);
		let value = wait_until("counter", Duration::from_secs(10), || {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move { Ok((n >= 2).then_some(n)) }
		})
		.await
		.unwrap();
		assert_eq!(value, 2);
	}

	#[tokio::test(start_paused = true)]
	async fn times_out_with_bounded_wait() {
		let err = wait_until::<(), _, _>("#never", Duration::from_secs(3), || async { Err(FanoutError::ElementNotFound("#never".into())) })
			.await
			.unwrap_err();
		assert_eq!(err.to_string(), "Timed out after 3s waiting for #never");
	}

	#[tokio::test(start_paused = true)]
	async fn hard_errors_stop_polling() {
		let calls = AtomicUsize::new(0);
		let err = wait_until::<(), _, _>("page", Duration::from_secs(30), || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(FanoutError::SessionLost("gone".into())) }
		})
		.await
		.unwrap_err();
		assert!(matches!(err, FanoutError::SessionLost(_)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
