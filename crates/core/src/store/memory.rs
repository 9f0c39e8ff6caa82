//! Volatile store backend used for dry runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use fanout_protocol::{Account, LedgerEntry, QuotaCounters};
use parking_lot::Mutex;

use super::{Store, StoreDocument};
use crate::error::{FanoutError, Result};

/// [`Store`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
	doc: Mutex<StoreDocument>,
	fail_ledger_writes: AtomicBool,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
		let store = Self::default();
		{
			let mut doc = store.doc.lock();
			for account in accounts {
				doc.upsert_account(&account);
			}
		}
		store
	}

	/// Makes every subsequent ledger write fail, simulating a broken disk.
	pub fn set_fail_ledger_writes(&self, fail: bool) {
		self.fail_ledger_writes.store(fail, Ordering::SeqCst);
	}

	/// Copy of the full document.
	pub fn snapshot(&self) -> StoreDocument {
		self.doc.lock().clone()
	}

	fn check_ledger_writable(&self) -> Result<()> {
		if self.fail_ledger_writes.load(Ordering::SeqCst) {
			return Err(FanoutError::Persistence("ledger writes disabled".to_string()));
		}
		Ok(())
	}
}

impl Store for MemoryStore {
	fn accounts(&self) -> Result<Vec<Account>> {
		Ok(self.doc.lock().accounts.clone())
	}

	fn account(&self, name: &str) -> Result<Option<Account>> {
		Ok(self.doc.lock().account(name).cloned())
	}

	fn upsert_account(&self, account: &Account) -> Result<()> {
		self.doc.lock().upsert_account(account);
		Ok(())
	}

	fn update_accounts(&self, accounts: &[Account]) -> Result<()> {
		self.doc.lock().update_accounts(accounts)
	}

	fn remove_account(&self, name: &str) -> Result<bool> {
		Ok(self.doc.lock().remove_account(name))
	}

	fn progress_batch(&self, names: &[String]) -> Result<HashMap<String, QuotaCounters>> {
		Ok(self.doc.lock().progress_batch(names))
	}

	fn set_counters(&self, name: &str, counters: QuotaCounters) -> Result<()> {
		self.doc.lock().set_counters(name, counters)
	}

	fn set_assigned_port(&self, name: &str, port: Option<u16>) -> Result<()> {
		self.doc.lock().set_assigned_port(name, port)
	}

	fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
		Ok(self.doc.lock().ledger.values().cloned().collect())
	}

	fn ledger_entry(&self, digest: &str) -> Result<Option<LedgerEntry>> {
		Ok(self.doc.lock().ledger.get(digest).cloned())
	}

	fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool> {
		self.check_ledger_writable()?;
		Ok(self.doc.lock().insert_ledger_entry(entry))
	}

	fn mark_ledger_deleted(&self, digest: &str) -> Result<bool> {
		self.check_ledger_writable()?;
		Ok(self.doc.lock().mark_ledger_deleted(digest))
	}
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	fn entry(digest: &str) -> LedgerEntry {
		LedgerEntry {
			digest: digest.to_string(),
			filename: "1----clip.mp4".to_string(),
			account: "alice".to_string(),
			reference: "1".to_string(),
			processed_on: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
			size: 10,
			deleted: false,
		}
	}

	#[test]
	fn ledger_insert_never_overwrites() {
		let store = MemoryStore::new();
		assert!(store.insert_ledger_entry(&entry("d1")).unwrap());
		let mut other = entry("d1");
		other.account = "bob".into();
		assert!(!store.insert_ledger_entry(&other).unwrap());
		assert_eq!(store.ledger_entry("d1").unwrap().unwrap().account, "alice");
	}

	#[test]
	fn mark_deleted_is_idempotent() {
		let store = MemoryStore::new();
		store.insert_ledger_entry(&entry("d1")).unwrap();
		assert!(store.mark_ledger_deleted("d1").unwrap());
		assert!(!store.mark_ledger_deleted("d1").unwrap());
		assert!(!store.mark_ledger_deleted("missing").unwrap());
		assert_eq!(store.ledger_entries().unwrap().len(), 1);
	}

	#[test]
	fn progress_batch_skips_unknown_names() {
		let store = MemoryStore::with_accounts([Account::new("alice"), Account::new("bob")]);
		let progress = store.progress_batch(&["alice".into(), "zed".into()]).unwrap();
		assert_eq!(progress.len(), 1);
		assert!(progress.contains_key("alice"));
	}

	#[test]
	fn counters_for_unknown_account_are_a_persistence_error() {
		let store = MemoryStore::new();
		let err = store.set_counters("ghost", QuotaCounters::default()).unwrap_err();
		assert!(err.to_string().contains("unknown account 'ghost'"));
	}

	#[test]
	fn failing_ledger_writes_surface_errors() {
		let store = MemoryStore::new();
		store.set_fail_ledger_writes(true);
		assert!(store.insert_ledger_entry(&entry("d1")).is_err());
	}
}
