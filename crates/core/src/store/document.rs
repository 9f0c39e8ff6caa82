//! In-memory document shared by the bundled store backends.

use std::collections::{BTreeMap, HashMap};

use fanout_protocol::{Account, LedgerEntry, QuotaCounters};
use serde::{Deserialize, Serialize};

use crate::error::{FanoutError, Result};

pub const STORE_SCHEMA_VERSION: u32 = 1;

/// Complete persisted state: the account roster and the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
	pub schema: u32,
	#[serde(default)]
	pub accounts: Vec<Account>,
	#[serde(default)]
	pub ledger: BTreeMap<String, LedgerEntry>,
}

impl Default for StoreDocument {
	fn default() -> Self {
		Self {
			schema: STORE_SCHEMA_VERSION,
			accounts: Vec::new(),
			ledger: BTreeMap::new(),
		}
	}
}

impl StoreDocument {
	pub fn account(&self, name: &str) -> Option<&Account> {
		self.accounts.iter().find(|a| a.name == name)
	}

	fn account_mut(&mut self, name: &str) -> Result<&mut Account> {
		self.accounts
			.iter_mut()
			.find(|a| a.name == name)
			.ok_or_else(|| FanoutError::Persistence(format!("unknown account '{name}'")))
	}

	pub fn upsert_account(&mut self, account: &Account) {
		match self.accounts.iter_mut().find(|a| a.name == account.name) {
			Some(existing) => *existing = account.clone(),
			None => self.accounts.push(account.clone()),
		}
	}

	pub fn update_accounts(&mut self, accounts: &[Account]) -> Result<()> {
		for account in accounts {
			*self.account_mut(&account.name)? = account.clone();
		}
		Ok(())
	}

	pub fn remove_account(&mut self, name: &str) -> bool {
		let before = self.accounts.len();
		self.accounts.retain(|a| a.name != name);
		before != self.accounts.len()
	}

	pub fn progress_batch(&self, names: &[String]) -> HashMap<String, QuotaCounters> {
		names
			.iter()
			.filter_map(|name| self.account(name).map(|a| (name.clone(), a.counters())))
			.collect()
	}

	pub fn set_counters(&mut self, name: &str, counters: QuotaCounters) -> Result<()> {
		self.account_mut(name)?.set_counters(counters);
		Ok(())
	}

	pub fn set_assigned_port(&mut self, name: &str, port: Option<u16>) -> Result<()> {
		self.account_mut(name)?.assigned_port = port;
		Ok(())
	}

	pub fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> bool {
		if self.ledger.contains_key(&entry.digest) {
			return false;
		}
		self.ledger.insert(entry.digest.clone(), entry.clone());
		true
	}

	pub fn mark_ledger_deleted(&mut self, digest: &str) -> bool {
		match self.ledger.get_mut(digest) {
			Some(entry) if !entry.deleted => {
				entry.deleted = true;
				true
			}
			_ => false,
		}
	}
}
