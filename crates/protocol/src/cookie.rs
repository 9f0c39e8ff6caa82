//! Browser cookie records used as account credentials.

use serde::{Deserialize, Serialize};

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SameSite {
	Strict,
	#[default]
	Lax,
	None,
}

/// A single cookie, shaped like a browser storage-state export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: Option<String>,
	#[serde(default)]
	pub path: Option<String>,
	/// Unix timestamp in seconds; `-1` or absent marks a session cookie.
	#[serde(default)]
	pub expires: Option<f64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
	#[serde(default)]
	pub same_site: Option<SameSite>,
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: None,
			path: None,
			expires: None,
			http_only: false,
			secure: false,
			same_site: None,
		}
	}

	pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = Some(domain.into());
		self
	}

	/// Returns the expiry only when it denotes a persistent cookie.
	pub fn persistent_expiry(&self) -> Option<f64> {
		self.expires.filter(|ts| *ts >= 0.0)
	}
}

/// Renders cookies as a `Cookie:` request header value.
pub fn cookie_header(cookies: &[Cookie]) -> String {
	cookies
		.iter()
		.map(|c| format!("{}={}", c.name, c.value))
		.collect::<Vec<_>>()
		.join("; ")
}

/// Storage-state file layout (`{"cookies": [...], "origins": [...]}`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageState {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub origins: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn storage_state_parses_exported_cookie() {
		let state: StorageState = serde_json::from_str(
			r#"{
  "cookies": [
    {
      "name": "session",
      "value": "token",
      "domain": ".example.com",
      "path": "/",
      "expires": -1.0,
      "httpOnly": true,
      "secure": true,
      "sameSite": "Lax"
    }
  ],
  "origins": []
}"#,
		)
		.unwrap();

		assert_eq!(state.cookies.len(), 1);
		let cookie = &state.cookies[0];
		assert!(cookie.http_only);
		assert_eq!(cookie.same_site, Some(SameSite::Lax));
		assert_eq!(cookie.persistent_expiry(), None);
	}

	#[test]
	fn cookie_header_joins_pairs() {
		let cookies = vec![Cookie::new("a", "1"), Cookie::new("b", "2")];
		assert_eq!(cookie_header(&cookies), "a=1; b=2");
		assert_eq!(cookie_header(&[]), "");
	}
}
