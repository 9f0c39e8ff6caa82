//! Error taxonomy for the publishing engine.
//!
//! Every error carries an [`ErrorClass`] that decides how the processor and
//! scheduler react: permanent item errors discard the item, transient errors
//! leave it on disk, acquisition errors skip the account and persistence
//! errors are escalated.

use std::fmt;

use fanout_runtime::AllocError;
use thiserror::Error;

/// How an error affects the item, account and run it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	/// The item itself is unusable. Discard it; never retry.
	PermanentItem,
	/// The environment misbehaved. Leave the item for a later run.
	TransientEnvironment,
	/// No session could be created for the account.
	ResourceAcquisition,
	/// Durable state could not be written.
	Persistence,
}

/// One failed session-creation tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
	pub tier: String,
	pub message: String,
}

impl fmt::Display for TierFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.tier, self.message)
	}
}

#[derive(Debug, Error)]
pub enum FanoutError {
	#[error("{0}")]
	Context(String),

	#[error("No reference id in item name '{0}'")]
	InvalidReference(String),

	#[error("Catalog rejected reference {reference}: {reason}")]
	Rejected { reference: String, reason: String },

	#[error("Catalog lookup failed: {0}")]
	Validation(String),

	#[error("Timed out after {timeout_secs}s waiting for {what}")]
	ElementTimeout { what: String, timeout_secs: u64 },

	#[error("Element not found: {0}")]
	ElementNotFound(String),

	#[error("Navigation to {url} failed: {source}")]
	Navigation {
		url: String,
		#[source]
		source: anyhow::Error,
	},

	#[error("Session lost: {0}")]
	SessionLost(String),

	#[error("Could not create a session for '{account}': {}", join_failures(.failures))]
	ResourceAcquisition { account: String, failures: Vec<TierFailure> },

	#[error(transparent)]
	PortsExhausted(#[from] AllocError),

	#[error("Invalid session transition {from} -> {to}")]
	InvalidTransition { from: &'static str, to: &'static str },

	#[error("Persistence failure: {0}")]
	Persistence(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl FanoutError {
	/// Classifies this error.
	///
	/// Anything not explicitly tied to the item or to durable state counts as
	/// transient, so an unknown failure never causes content to be discarded.
	pub fn class(&self) -> ErrorClass {
		match self {
			Self::InvalidReference(_) | Self::Rejected { .. } => ErrorClass::PermanentItem,
			Self::ResourceAcquisition { .. } | Self::PortsExhausted(_) => ErrorClass::ResourceAcquisition,
			Self::Persistence(_) => ErrorClass::Persistence,
			_ => ErrorClass::TransientEnvironment,
		}
	}

	pub fn is_permanent(&self) -> bool {
		self.class() == ErrorClass::PermanentItem
	}

	/// Wraps any storage-layer failure as a persistence error.
	pub fn persistence(err: impl fmt::Display) -> Self {
		Self::Persistence(err.to_string())
	}
}

fn join_failures(failures: &[TierFailure]) -> String {
	if failures.is_empty() {
		return "no session launchers configured".to_string();
	}
	failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

pub type Result<T> = std::result::Result<T, FanoutError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classes_split_item_and_environment_failures() {
		assert_eq!(FanoutError::InvalidReference("x.mp4".into()).class(), ErrorClass::PermanentItem);
		assert!(
			FanoutError::Rejected {
				reference: "1".into(),
				reason: "unknown".into()
			}
			.is_permanent()
		);
		assert_eq!(FanoutError::Validation("timeout".into()).class(), ErrorClass::TransientEnvironment);
		assert_eq!(
			FanoutError::ElementTimeout {
				what: "#publish".into(),
				timeout_secs: 30
			}
			.class(),
			ErrorClass::TransientEnvironment
		);
		assert_eq!(FanoutError::persistence("disk full").class(), ErrorClass::Persistence);
	}

	#[test]
	fn acquisition_error_lists_every_tier() {
		let err = FanoutError::ResourceAcquisition {
			account: "bob".into(),
			failures: vec![
				TierFailure {
					tier: "bundled".into(),
					message: "missing".into(),
				},
				TierFailure {
					tier: "host".into(),
					message: "not on PATH".into(),
				},
			],
		};
		let text = err.to_string();
		assert!(text.contains("'bob'"));
		assert!(text.contains("bundled: missing; host: not on PATH"));
		assert_eq!(err.class(), ErrorClass::ResourceAcquisition);
	}
}
