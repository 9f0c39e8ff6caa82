//! External catalog validation of reference ids.

use async_trait::async_trait;
use fanout_protocol::{Cookie, ItemDescription};

use crate::error::Result;

/// Answer from the catalog for one reference id.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
	Accepted(ItemDescription),
	/// The catalog positively refused the reference. Permanent for the item.
	Rejected(String),
}

/// Resolves reference ids against an external catalog.
///
/// Implementations must return `Ok(Validation::Rejected)` only for an
/// explicit negative answer. Transport failures, unexpected status codes and
/// unparseable responses are errors, which the processor treats as transient.
#[async_trait]
pub trait Validator: Send + Sync {
	async fn validate(&self, reference: &str, credentials: &[Cookie]) -> Result<Validation>;
}

/// Trims whitespace and leading zeros so `"007"` and `"7"` resolve alike.
pub fn normalize_reference(raw: &str) -> String {
	let trimmed = raw.trim();
	let stripped = trimmed.trim_start_matches('0');
	if stripped.is_empty() && !trimmed.is_empty() {
		"0".to_string()
	} else {
		stripped.to_string()
	}
}

/// Accepts every reference with a bare description. Used when no catalog is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl Validator for AcceptAll {
	async fn validate(&self, reference: &str, _credentials: &[Cookie]) -> Result<Validation> {
		Ok(Validation::Accepted(ItemDescription {
			external_id: reference.to_string(),
			..Default::default()
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_strips_padding() {
		assert_eq!(normalize_reference(" 00123 "), "123");
		assert_eq!(normalize_reference("000"), "0");
		assert_eq!(normalize_reference("98"), "98");
		assert_eq!(normalize_reference(""), "");
	}

	#[tokio::test]
	async fn accept_all_echoes_reference() {
		let result = AcceptAll.validate("42", &[]).await.unwrap();
		assert_eq!(
			result,
			Validation::Accepted(ItemDescription {
				external_id: "42".into(),
				..Default::default()
			})
		);
	}
}
