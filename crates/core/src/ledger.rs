//! Content-digest ledger guaranteeing at-most-once publication.
//!
//! The ledger is the only thing standing between a restart and a duplicate
//! publication, so every write goes through [`Store`] before it is trusted
//! and every failure surfaces as [`FanoutError::Persistence`].

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use fanout_protocol::LedgerEntry;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{FanoutError, Result};
use crate::store::Store;

const BUFFER_SIZE: usize = 8 * 1024;

/// Streams `path` through SHA-256 in fixed chunks.
pub fn compute_digest(path: &Path) -> Result<String> {
	let mut file = File::open(path).with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
	let mut hasher = Sha256::new();
	let mut buffer = [0_u8; BUFFER_SIZE];

	loop {
		let bytes_read = file
			.read(&mut buffer)
			.with_context(|| format!("Failed while hashing file: {}", path.display()))?;
		if bytes_read == 0 {
			break;
		}
		hasher.update(&buffer[..bytes_read]);
	}

	Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Metadata stored alongside a processed digest.
#[derive(Debug, Clone)]
pub struct ProcessedItem<'a> {
	pub filename: &'a str,
	pub account: &'a str,
	pub reference: &'a str,
	pub size: u64,
}

/// Aggregate ledger counts for operator reporting.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LedgerStats {
	pub total: usize,
	pub today: usize,
	pub deleted: usize,
	pub per_account: BTreeMap<String, usize>,
}

/// Idempotence ledger keyed by content digest.
pub struct ContentHashStore {
	store: Arc<dyn Store>,
	clock: Arc<dyn Clock>,
	index: RwLock<HashSet<String>>,
	/// Digests currently being published by some worker.
	in_flight: Mutex<HashSet<String>>,
}

/// Exclusive in-flight hold on a digest; released on drop.
pub struct DigestClaim<'a> {
	ledger: &'a ContentHashStore,
	digest: String,
}

impl Drop for DigestClaim<'_> {
	fn drop(&mut self) {
		self.ledger.in_flight.lock().remove(&self.digest);
	}
}

impl ContentHashStore {
	/// Loads the digest index from `store`.
	pub fn open(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Result<Self> {
		let entries = store.ledger_entries().map_err(escalate)?;
		let index = entries.into_iter().map(|entry| entry.digest).collect::<HashSet<_>>();
		debug!(target: "fanout.ledger", entries = index.len(), "ledger index loaded");
		Ok(Self {
			store,
			clock,
			index: RwLock::new(index),
			in_flight: Mutex::new(HashSet::new()),
		})
	}

	pub fn is_processed(&self, digest: &str) -> bool {
		self.index.read().contains(digest)
	}

	/// Reserves `digest` for one publication attempt.
	///
	/// Returns `None` when the digest is already recorded or another worker
	/// holds it, so identical content is never published twice in one run.
	pub fn try_claim(&self, digest: &str) -> Option<DigestClaim<'_>> {
		let mut in_flight = self.in_flight.lock();
		if self.is_processed(digest) || !in_flight.insert(digest.to_string()) {
			return None;
		}
		Some(DigestClaim {
			ledger: self,
			digest: digest.to_string(),
		})
	}

	pub fn len(&self) -> usize {
		self.index.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.read().is_empty()
	}

	/// Durably records a successful publication.
	///
	/// Returns `false` when the digest was already recorded; the existing
	/// entry is left untouched. The in-memory index only changes after the
	/// store write succeeded.
	pub fn record_processed(&self, digest: &str, item: ProcessedItem<'_>) -> Result<bool> {
		let entry = LedgerEntry {
			digest: digest.to_string(),
			filename: item.filename.to_string(),
			account: item.account.to_string(),
			reference: item.reference.to_string(),
			processed_on: self.clock.today(),
			size: item.size,
			deleted: false,
		};

		let inserted = self.store.insert_ledger_entry(&entry).map_err(escalate)?;
		self.index.write().insert(digest.to_string());
		if inserted {
			debug!(target: "fanout.ledger", %digest, account = %item.account, "ledger entry recorded");
		} else {
			warn!(target: "fanout.ledger", %digest, "digest already recorded; keeping existing entry");
		}
		Ok(inserted)
	}

	/// Flags the entry's source file as removed. The entry itself stays.
	pub fn mark_deleted(&self, digest: &str) -> Result<bool> {
		self.store.mark_ledger_deleted(digest).map_err(escalate)
	}

	pub fn entry(&self, digest: &str) -> Result<Option<LedgerEntry>> {
		self.store.ledger_entry(digest).map_err(escalate)
	}

	pub fn statistics(&self) -> Result<LedgerStats> {
		let today = self.clock.today();
		let entries = self.store.ledger_entries().map_err(escalate)?;
		let mut stats = LedgerStats::default();
		for entry in entries {
			stats.total += 1;
			if entry.processed_on == today {
				stats.today += 1;
			}
			if entry.deleted {
				stats.deleted += 1;
			}
			*stats.per_account.entry(entry.account).or_default() += 1;
		}
		Ok(stats)
	}
}

fn escalate(err: FanoutError) -> FanoutError {
	match err {
		FanoutError::Persistence(_) => err,
		other => FanoutError::persistence(other),
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use chrono::NaiveDate;
	use tempfile::TempDir;

	use super::*;
	use crate::clock::FixedClock;
	use crate::store::MemoryStore;

	fn ledger(store: Arc<MemoryStore>) -> ContentHashStore {
		let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2026, 6, 2).unwrap()));
		ContentHashStore::open(store, clock).unwrap()
	}

	fn item<'a>(account: &'a str) -> ProcessedItem<'a> {
		ProcessedItem {
			filename: "7----clip.mp4",
			account,
			reference: "7",
			size: 3,
		}
	}

	#[test]
	fn digest_matches_known_sha256() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("abc.bin");
		std::fs::write(&path, b"abc").unwrap();
		assert_eq!(
			compute_digest(&path).unwrap(),
			"sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
		);
	}

	#[test]
	fn digest_streams_files_larger_than_buffer() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("big.bin");
		let mut file = File::create(&path).unwrap();
		for _ in 0..5 {
			file.write_all(&[7_u8; BUFFER_SIZE]).unwrap();
		}
		file.write_all(b"tail").unwrap();
		drop(file);

		let mut hasher = Sha256::new();
		hasher.update(std::fs::read(&path).unwrap());
		assert_eq!(compute_digest(&path).unwrap(), format!("sha256:{:x}", hasher.finalize()));
	}

	#[test]
	fn digest_of_missing_file_names_path() {
		let err = compute_digest(Path::new("/definitely/missing.mp4")).unwrap_err();
		assert!(err.to_string().contains("/definitely/missing.mp4"));
	}

	#[test]
	fn recorded_digest_is_processed_and_survives_reopen() {
		let store = Arc::new(MemoryStore::new());
		let first = ledger(Arc::clone(&store));
		assert!(!first.is_processed("sha256:aa"));
		assert!(first.record_processed("sha256:aa", item("alice")).unwrap());
		assert!(first.is_processed("sha256:aa"));

		let reopened = ledger(store);
		assert!(reopened.is_processed("sha256:aa"));
		assert_eq!(reopened.len(), 1);
	}

	#[test]
	fn duplicate_record_keeps_first_entry() {
		let store = Arc::new(MemoryStore::new());
		let ledger = ledger(store);
		assert!(ledger.record_processed("sha256:aa", item("alice")).unwrap());
		assert!(!ledger.record_processed("sha256:aa", item("bob")).unwrap());
		assert_eq!(ledger.entry("sha256:aa").unwrap().unwrap().account, "alice");
	}

	#[test]
	fn mark_deleted_keeps_entry_processed() {
		let store = Arc::new(MemoryStore::new());
		let ledger = ledger(store);
		ledger.record_processed("sha256:aa", item("alice")).unwrap();
		assert!(ledger.mark_deleted("sha256:aa").unwrap());
		assert!(!ledger.mark_deleted("sha256:aa").unwrap());
		assert!(ledger.is_processed("sha256:aa"));
		assert!(ledger.entry("sha256:aa").unwrap().unwrap().deleted);
	}

	#[test]
	fn failed_write_is_escalated_and_not_indexed() {
		let store = Arc::new(MemoryStore::new());
		let ledger = ledger(Arc::clone(&store));
		store.set_fail_ledger_writes(true);
		let err = ledger.record_processed("sha256:aa", item("alice")).unwrap_err();
		assert!(matches!(err, FanoutError::Persistence(_)));
		assert!(!ledger.is_processed("sha256:aa"));
	}

	#[test]
	fn statistics_group_by_account() {
		let store = Arc::new(MemoryStore::new());
		let ledger = ledger(store);
		ledger.record_processed("sha256:aa", item("alice")).unwrap();
		ledger.record_processed("sha256:bb", item("alice")).unwrap();
		ledger.record_processed("sha256:cc", item("bob")).unwrap();
		ledger.mark_deleted("sha256:cc").unwrap();

		let stats = ledger.statistics().unwrap();
		assert_eq!(stats.total, 3);
		assert_eq!(stats.today, 3);
		assert_eq!(stats.deleted, 1);
		assert_eq!(stats.per_account["alice"], 2);
		assert_eq!(stats.per_account["bob"], 1);
	}

	#[test]
	fn claims_are_exclusive_until_dropped() {
		let ledger = ledger(Arc::new(MemoryStore::new()));
		let claim = ledger.try_claim("sha256:aa").unwrap();
		assert!(ledger.try_claim("sha256:aa").is_none());
		assert!(ledger.try_claim("sha256:bb").is_some());
		drop(claim);
		assert!(ledger.try_claim("sha256:aa").is_some());
	}

	#[test]
	fn recorded_digest_cannot_be_claimed() {
		let ledger = ledger(Arc::new(MemoryStore::new()));
		ledger.record_processed("sha256:aa", item("alice")).unwrap();
		assert!(ledger.try_claim("sha256:aa").is_none());
	}
}
