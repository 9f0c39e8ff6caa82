//! Persistence collaborator interface.
//!
//! The engine never assumes a storage format. It talks to a [`Store`], which
//! must offer one "get all" call and one batch progress query so quota checks
//! for a whole roster cost a single round-trip.

use std::collections::HashMap;

use fanout_protocol::{Account, LedgerEntry, QuotaCounters};

use crate::error::Result;

mod document;
mod memory;

pub use document::{STORE_SCHEMA_VERSION, StoreDocument};
pub use memory::MemoryStore;

/// Account and ledger persistence.
///
/// Every write must be durable when it returns: the ledger relies on
/// [`Store::insert_ledger_entry`] completing before a source file is deleted.
pub trait Store: Send + Sync {
	/// All accounts in roster order.
	fn accounts(&self) -> Result<Vec<Account>>;

	fn account(&self, name: &str) -> Result<Option<Account>>;

	/// Inserts a new account or replaces the record with the same name.
	fn upsert_account(&self, account: &Account) -> Result<()>;

	/// Replaces several existing records in one write.
	fn update_accounts(&self, accounts: &[Account]) -> Result<()>;

	fn remove_account(&self, name: &str) -> Result<bool>;

	/// Quota counters for `names`. Unknown names are absent from the map.
	fn progress_batch(&self, names: &[String]) -> Result<HashMap<String, QuotaCounters>>;

	fn set_counters(&self, name: &str, counters: QuotaCounters) -> Result<()>;

	fn set_assigned_port(&self, name: &str, port: Option<u16>) -> Result<()>;

	fn ledger_entries(&self) -> Result<Vec<LedgerEntry>>;

	fn ledger_entry(&self, digest: &str) -> Result<Option<LedgerEntry>>;

	/// Returns `false` without writing when the digest already has an entry.
	fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool>;

	/// Returns `false` when the digest is unknown or already flagged.
	fn mark_ledger_deleted(&self, digest: &str) -> Result<bool>;
}
