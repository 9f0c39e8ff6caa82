//! Publishing identities and their quota counters.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cookie::Cookie;

/// Whether an account takes part in batch runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
	#[default]
	Active,
	Inactive,
}

/// A publishing identity.
///
/// The live session bound to an account is tracked by the session manager and
/// never serialized; `assigned_port` records which resource id it held so a
/// stale browser can be found after a crash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub name: String,
	#[serde(default)]
	pub status: AccountStatus,
	#[serde(default)]
	pub credentials: Vec<Cookie>,
	#[serde(default)]
	pub published_today: u32,
	#[serde(default)]
	pub last_reset_date: Option<NaiveDate>,
	#[serde(default)]
	pub lifetime_published: u64,
	#[serde(default)]
	pub assigned_port: Option<u16>,
	#[serde(default)]
	pub notes: BTreeMap<String, String>,
}

impl Account {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			status: AccountStatus::Active,
			credentials: Vec::new(),
			published_today: 0,
			last_reset_date: None,
			lifetime_published: 0,
			assigned_port: None,
			notes: BTreeMap::new(),
		}
	}

	pub fn with_credentials(mut self, credentials: Vec<Cookie>) -> Self {
		self.credentials = credentials;
		self
	}

	pub fn is_active(&self) -> bool {
		self.status == AccountStatus::Active
	}

	pub fn counters(&self) -> QuotaCounters {
		QuotaCounters {
			published_today: self.published_today,
			last_reset_date: self.last_reset_date,
			lifetime_published: self.lifetime_published,
		}
	}

	pub fn set_counters(&mut self, counters: QuotaCounters) {
		self.published_today = counters.published_today;
		self.last_reset_date = counters.last_reset_date;
		self.lifetime_published = counters.lifetime_published;
	}
}

/// Quota fields of one account, as returned by batch progress queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCounters {
	pub published_today: u32,
	pub last_reset_date: Option<NaiveDate>,
	pub lifetime_published: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minimal_record_fills_defaults() {
		let account: Account = serde_json::from_str(r#"{"name":"alice"}"#).unwrap();
		assert_eq!(account.name, "alice");
		assert!(account.is_active());
		assert_eq!(account.published_today, 0);
		assert!(account.last_reset_date.is_none());
		assert!(account.notes.is_empty());
	}

	#[test]
	fn record_uses_camel_case_keys() {
		let mut account = Account::new("bob");
		account.last_reset_date = NaiveDate::from_ymd_opt(2026, 3, 1);
		account.published_today = 4;
		let value = serde_json::to_value(&account).unwrap();
		assert_eq!(value["publishedToday"], 4);
		assert_eq!(value["lastResetDate"], "2026-03-01");
		assert_eq!(value["status"], "active");
	}
}
