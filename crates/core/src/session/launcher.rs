//! Ordered session-creation strategies.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::handle::AutomationSession;
use crate::error::{Result, TierFailure};

/// Everything a launcher needs to start one session.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
	pub account: &'a str,
	/// Exclusive port for this session's driver.
	pub port: u16,
	pub headless: bool,
	/// Browser profile directory, when sessions keep per-account profiles.
	pub profile_dir: Option<PathBuf>,
}

/// One way of bringing up an automation session.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
	/// Short tier name used in diagnostics (for example `bundled`).
	fn tier(&self) -> &str;

	async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Box<dyn AutomationSession>>;
}

/// Tries each launcher in order and returns the first session that starts.
///
/// On total failure every tier's error is returned, in order.
pub async fn launch_with_fallback(
	launchers: &[Box<dyn SessionLauncher>],
	request: &LaunchRequest<'_>,
) -> std::result::Result<(String, Box<dyn AutomationSession>), Vec<TierFailure>> {
	let mut failures = Vec::with_capacity(launchers.len());
	for launcher in launchers {
		match launcher.launch(request).await {
			Ok(handle) => {
				debug!(
					target: "fanout.session",
					account = %request.account,
					tier = launcher.tier(),
					port = request.port,
					"session launched"
				);
				return Ok((launcher.tier().to_string(), handle));
			}
			Err(err) => {
				warn!(
					target: "fanout.session",
					account = %request.account,
					tier = launcher.tier(),
					error = %err,
					"launch tier failed; trying next"
				);
				failures.push(TierFailure {
					tier: launcher.tier().to_string(),
					message: err.to_string(),
				});
			}
		}
	}
	Err(failures)
}
