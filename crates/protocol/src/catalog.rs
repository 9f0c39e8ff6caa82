//! Catalog lookups for external item references.

use serde::{Deserialize, Serialize};

/// Structured description of a catalog item that a reference id resolved to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescription {
	pub external_id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub price: Option<f64>,
	#[serde(default)]
	pub commission: Option<f64>,
}
