//! Publication ledger records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One published content item, keyed by its content digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
	pub digest: String,
	pub filename: String,
	pub account: String,
	pub reference: String,
	pub processed_on: NaiveDate,
	#[serde(default)]
	pub size: u64,
	/// Set once the source file has been removed from disk.
	#[serde(default)]
	pub deleted: bool,
}
