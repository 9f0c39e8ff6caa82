//! Single-file JSON [`Store`] backend.
//!
//! The whole roster and ledger live in one document. Every mutation is
//! written to a sibling temp file, fsynced and renamed over the target, so a
//! crash leaves either the old or the new document on disk, never a torn one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fanout::store::{STORE_SCHEMA_VERSION, Store, StoreDocument};
use fanout::{FanoutError, Result};
use fanout_protocol::{Account, LedgerEntry, QuotaCounters};
use parking_lot::Mutex;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct JsonStore {
	path: PathBuf,
	doc: Mutex<StoreDocument>,
}

impl JsonStore {
	/// Opens `path`, starting empty when the file does not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let doc = match fs::read_to_string(&path) {
			Ok(raw) => {
				let doc: StoreDocument = serde_json::from_str(&raw)
					.map_err(|e| FanoutError::Persistence(format!("Corrupt data file {}: {e}", path.display())))?;
				if doc.schema > STORE_SCHEMA_VERSION {
					return Err(FanoutError::Persistence(format!(
						"Data file {} has schema {} but this build understands up to {}",
						path.display(),
						doc.schema,
						STORE_SCHEMA_VERSION
					)));
				}
				doc
			}
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
			Err(err) => return Err(FanoutError::Persistence(format!("Failed to read {}: {err}", path.display()))),
		};
		debug!(
			target: "fanout.store",
			path = %path.display(),
			accounts = doc.accounts.len(),
			ledger = doc.ledger.len(),
			"data file opened"
		);
		Ok(Self { path, doc: Mutex::new(doc) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T> {
		Ok(f(&self.doc.lock()))
	}

	/// Applies `f` to a copy, persists the copy and only then makes it current.
	fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
		let mut doc = self.doc.lock();
		let mut next = doc.clone();
		let out = f(&mut next)?;
		write_atomic(&self.path, &next)?;
		*doc = next;
		Ok(out)
	}
}

fn write_atomic(path: &Path, doc: &StoreDocument) -> Result<()> {
	let persist = |path: &Path| -> std::io::Result<()> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)?;
		}
		let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
		tmp_name.push(".tmp");
		let tmp = path.with_file_name(tmp_name);

		let json = serde_json::to_vec_pretty(doc)?;
		let mut file = File::create(&tmp)?;
		file.write_all(&json)?;
		file.sync_all()?;
		drop(file);
		fs::rename(&tmp, path)
	};
	persist(path).map_err(|e| FanoutError::Persistence(format!("Failed to write {}: {e}", path.display())))?;
	trace!(target: "fanout.store", path = %path.display(), "data file written");
	Ok(())
}

impl Store for JsonStore {
	fn accounts(&self) -> Result<Vec<Account>> {
		self.read(|doc| doc.accounts.clone())
	}

	fn account(&self, name: &str) -> Result<Option<Account>> {
		self.read(|doc| doc.account(name).cloned())
	}

	fn upsert_account(&self, account: &Account) -> Result<()> {
		self.mutate(|doc| {
			doc.upsert_account(account);
			Ok(())
		})
	}

	fn update_accounts(&self, accounts: &[Account]) -> Result<()> {
		self.mutate(|doc| doc.update_accounts(accounts))
	}

	fn remove_account(&self, name: &str) -> Result<bool> {
		if self.read(|doc| doc.account(name).is_none())? {
			return Ok(false);
		}
		self.mutate(|doc| Ok(doc.remove_account(name)))
	}

	fn progress_batch(&self, names: &[String]) -> Result<HashMap<String, QuotaCounters>> {
		self.read(|doc| doc.progress_batch(names))
	}

	fn set_counters(&self, name: &str, counters: QuotaCounters) -> Result<()> {
		self.mutate(|doc| doc.set_counters(name, counters))
	}

	fn set_assigned_port(&self, name: &str, port: Option<u16>) -> Result<()> {
		self.mutate(|doc| doc.set_assigned_port(name, port))
	}

	fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
		self.read(|doc| doc.ledger.values().cloned().collect())
	}

	fn ledger_entry(&self, digest: &str) -> Result<Option<LedgerEntry>> {
		self.read(|doc| doc.ledger.get(digest).cloned())
	}

	fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool> {
		if self.read(|doc| doc.ledger.contains_key(&entry.digest))? {
			return Ok(false);
		}
		self.mutate(|doc| Ok(doc.insert_ledger_entry(entry)))
	}

	fn mark_ledger_deleted(&self, digest: &str) -> Result<bool> {
		if !self.read(|doc| doc.ledger.get(digest).is_some_and(|e| !e.deleted))? {
			return Ok(false);
		}
		self.mutate(|doc| Ok(doc.mark_ledger_deleted(digest)))
	}
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;
	use tempfile::TempDir;

	use super::*;

	fn entry(digest: &str) -> LedgerEntry {
		LedgerEntry {
			digest: digest.to_string(),
			filename: "1----a.mp4".to_string(),
			account: "alice".to_string(),
			reference: "1".to_string(),
			processed_on: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
			size: 10,
			deleted: false,
		}
	}

	#[test]
	fn missing_file_opens_empty() {
		let temp = TempDir::new().unwrap();
		let store = JsonStore::open(temp.path().join("data.json")).unwrap();
		assert!(store.accounts().unwrap().is_empty());
		assert!(!temp.path().join("data.json").exists());
	}

	#[test]
	fn writes_survive_reopen() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("nested").join("data.json");
		{
			let store = JsonStore::open(&path).unwrap();
			store.upsert_account(&Account::new("alice")).unwrap();
			assert!(store.insert_ledger_entry(&entry("sha256:aa")).unwrap());
			assert!(store.mark_ledger_deleted("sha256:aa").unwrap());
			store.set_assigned_port("alice", Some(9311)).unwrap();
		}

		let store = JsonStore::open(&path).unwrap();
		assert_eq!(store.account("alice").unwrap().unwrap().assigned_port, Some(9311));
		assert!(store.ledger_entry("sha256:aa").unwrap().unwrap().deleted);
		assert!(!path.with_file_name("data.json.tmp").exists());
	}

	#[test]
	fn duplicate_ledger_insert_is_refused() {
		let temp = TempDir::new().unwrap();
		let store = JsonStore::open(temp.path().join("data.json")).unwrap();
		assert!(store.insert_ledger_entry(&entry("sha256:bb")).unwrap());
		assert!(!store.insert_ledger_entry(&entry("sha256:bb")).unwrap());
		assert_eq!(store.ledger_entries().unwrap().len(), 1);
	}

	#[test]
	fn failed_mutation_leaves_state_untouched() {
		let temp = TempDir::new().unwrap();
		let store = JsonStore::open(temp.path().join("data.json")).unwrap();
		let err = store.set_counters("ghost", QuotaCounters::default()).unwrap_err();
		assert!(matches!(err, FanoutError::Persistence(_)));
		assert!(store.accounts().unwrap().is_empty());
	}

	#[test]
	fn corrupt_file_is_an_error_not_a_reset() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("data.json");
		fs::write(&path, "{ not json").unwrap();
		assert!(matches!(JsonStore::open(&path), Err(FanoutError::Persistence(_))));
		assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
	}

	#[test]
	fn newer_schema_is_refused() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("data.json");
		fs::write(&path, r#"{"schema":99,"accounts":[],"ledger":{}}"#).unwrap();
		assert!(JsonStore::open(&path).is_err());
	}
}
