//! W3C WebDriver backed automation sessions.
//!
//! Each account session runs its own driver process on the account's
//! allocated port. Three launcher tiers locate that driver: the one bundled
//! next to the binary, one on `PATH`, and one fetched into a cache directory.

mod client;
mod driver;
mod launcher;

pub use client::WebDriverSession;
pub use driver::{DriverTier, fetch_driver, locate_driver};
pub use launcher::{DriverLauncher, driver_launchers};

use fanout::FanoutError;
use thiserror::Error;

/// Failures talking to a driver endpoint.
#[derive(Debug, Error)]
pub enum WebDriverError {
	#[error("driver unreachable: {0}")]
	Transport(#[from] reqwest::Error),

	#[error("{error}: {message}")]
	Command { error: String, message: String },

	#[error("unexpected driver response: {0}")]
	Protocol(String),
}

impl WebDriverError {
	/// W3C error code, when the driver answered with one.
	pub fn code(&self) -> Option<&str> {
		match self {
			Self::Command { error, .. } => Some(error),
			_ => None,
		}
	}
}

impl From<WebDriverError> for FanoutError {
	fn from(err: WebDriverError) -> Self {
		match err.code() {
			Some("no such element") | Some("stale element reference") => FanoutError::ElementNotFound(err.to_string()),
			Some("invalid session id") | Some("no such window") | Some("session not created") => FanoutError::SessionLost(err.to_string()),
			Some("timeout") | Some("script timeout") => FanoutError::ElementTimeout {
				what: err.to_string(),
				timeout_secs: 0,
			},
			_ => match err {
				WebDriverError::Transport(_) => FanoutError::SessionLost(err.to_string()),
				other => FanoutError::Context(other.to_string()),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn command(code: &str) -> WebDriverError {
		WebDriverError::Command {
			error: code.to_string(),
			message: "boom".to_string(),
		}
	}

	#[test]
	fn driver_codes_map_to_error_classes() {
		assert!(matches!(FanoutError::from(command("no such element")), FanoutError::ElementNotFound(_)));
		assert!(matches!(FanoutError::from(command("invalid session id")), FanoutError::SessionLost(_)));
		assert!(matches!(FanoutError::from(command("timeout")), FanoutError::ElementTimeout { .. }));
		assert!(matches!(FanoutError::from(command("unknown error")), FanoutError::Context(_)));
	}

	#[test]
	fn driver_errors_are_never_permanent() {
		for code in ["no such element", "invalid session id", "javascript error"] {
			assert!(!FanoutError::from(command(code)).is_permanent(), "{code}");
		}
	}
}
