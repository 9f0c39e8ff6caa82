//! Per-account daily publication quota.
//!
//! Day rollover is lazy: the first read on a new local date resets the
//! account's daily count and persists the new reset date. Lifetime counts
//! only ever grow.
//!
//! Reads are not serialized against in-flight publications, so a worker may
//! see a count that is one item stale. With one worker per account that
//! bounds the overshoot to one item per active worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use fanout_protocol::{Account, QuotaCounters};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{FanoutError, Result};
use crate::store::Store;

/// Daily progress of one account against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
	pub published_today: u32,
	pub target: u32,
	pub complete: bool,
}

impl Progress {
	fn new(published_today: u32, target: u32) -> Self {
		Self {
			published_today,
			target,
			complete: published_today >= target,
		}
	}

	pub fn remaining(&self) -> u32 {
		self.target.saturating_sub(self.published_today)
	}
}

impl fmt::Display for Progress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = if self.complete { "complete" } else { "in progress" };
		write!(f, "{}/{} {}", self.published_today, self.target, state)
	}
}

/// Roster split produced by the pre-run quota check.
#[derive(Debug, Default)]
pub struct RosterPartition {
	pub eligible: Vec<Account>,
	pub complete: Vec<(String, Progress)>,
}

pub struct AccountQuotaTracker {
	store: Arc<dyn Store>,
	clock: Arc<dyn Clock>,
	write_lock: Mutex<()>,
}

impl AccountQuotaTracker {
	pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
		Self {
			store,
			clock,
			write_lock: Mutex::new(()),
		}
	}

	pub fn today(&self) -> NaiveDate {
		self.clock.today()
	}

	/// Current progress for one account, rolling the day over if needed.
	pub fn progress(&self, account: &str, target: u32) -> Result<Progress> {
		let counters = self.current_counters(account)?;
		Ok(Progress::new(counters.published_today, target))
	}

	/// Progress for many accounts with one store query. Unknown names are omitted.
	pub fn batch_progress(&self, names: &[String], target: u32) -> Result<HashMap<String, Progress>> {
		let today = self.clock.today();
		let counters = self.store.progress_batch(names)?;
		let mut progress = HashMap::with_capacity(counters.len());
		for (name, stored) in counters {
			let (rolled, changed) = roll_over(stored, today);
			if changed {
				self.persist_rollover(&name, rolled)?;
			}
			progress.insert(name, Progress::new(rolled.published_today, target));
		}
		Ok(progress)
	}

	/// Splits `roster` into accounts that still have quota left and those that are done.
	///
	/// Roster order is preserved for the eligible list. Accounts the store does
	/// not know are treated as having published nothing.
	pub fn partition(&self, roster: Vec<Account>, target: u32) -> Result<RosterPartition> {
		let names: Vec<String> = roster.iter().map(|a| a.name.clone()).collect();
		let progress = self.batch_progress(&names, target)?;
		let mut partition = RosterPartition::default();
		for account in roster {
			match progress.get(&account.name) {
				Some(p) if p.complete => partition.complete.push((account.name.clone(), *p)),
				_ => partition.eligible.push(account),
			}
		}
		Ok(partition)
	}

	/// Counts one successful publication for `account`.
	pub fn record_success(&self, account: &str) -> Result<QuotaCounters> {
		let _guard = self.write_lock.lock();
		let mut counters = self.read_rolled(account)?.0;
		counters.published_today = counters.published_today.saturating_add(1);
		counters.lifetime_published = counters.lifetime_published.saturating_add(1);
		self.store.set_counters(account, counters)?;
		debug!(
			target: "fanout.quota",
			%account,
			today = counters.published_today,
			lifetime = counters.lifetime_published,
			"publication counted"
		);
		Ok(counters)
	}

	fn current_counters(&self, account: &str) -> Result<QuotaCounters> {
		let (counters, changed) = self.read_rolled(account)?;
		if changed {
			self.persist_rollover(account, counters)?;
		}
		Ok(counters)
	}

	fn read_rolled(&self, account: &str) -> Result<(QuotaCounters, bool)> {
		let stored = self
			.store
			.account(account)?
			.ok_or_else(|| FanoutError::Context(format!("Unknown account '{account}'")))?
			.counters();
		Ok(roll_over(stored, self.clock.today()))
	}

	fn persist_rollover(&self, account: &str, counters: QuotaCounters) -> Result<()> {
		let _guard = self.write_lock.lock();
		// Re-read under the lock so a concurrent increment is not lost.
		let latest = self.store.progress_batch(&[account.to_string()])?.remove(account).unwrap_or_default();
		let (rolled, changed) = roll_over(latest, counters.last_reset_date.unwrap_or_else(|| self.clock.today()));
		if changed {
			self.store.set_counters(account, rolled)?;
			debug!(target: "fanout.quota", %account, date = ?rolled.last_reset_date, "daily count reset");
		}
		Ok(())
	}
}

fn roll_over(mut counters: QuotaCounters, today: NaiveDate) -> (QuotaCounters, bool) {
	if counters.last_reset_date == Some(today) {
		return (counters, false);
	}
	counters.published_today = 0;
	counters.last_reset_date = Some(today);
	(counters, true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use crate::store::MemoryStore;

	fn day(d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
	}

	fn setup(accounts: Vec<Account>) -> (Arc<MemoryStore>, Arc<FixedClock>, AccountQuotaTracker) {
		let store = Arc::new(MemoryStore::with_accounts(accounts));
		let clock = Arc::new(FixedClock::new(day(10)));
		let tracker = AccountQuotaTracker::new(store.clone(), clock.clone());
		(store, clock, tracker)
	}

	fn account(name: &str, today: u32, reset: NaiveDate, lifetime: u64) -> Account {
		let mut account = Account::new(name);
		account.published_today = today;
		account.last_reset_date = Some(reset);
		account.lifetime_published = lifetime;
		account
	}

	#[test]
	fn yesterday_count_resets_but_lifetime_stays() {
		let (store, _clock, tracker) = setup(vec![account("alice", 5, day(9), 40)]);
		let progress = tracker.progress("alice", 5).unwrap();
		assert_eq!(progress.published_today, 0);
		assert!(!progress.complete);

		let stored = store.account("alice").unwrap().unwrap();
		assert_eq!(stored.published_today, 0);
		assert_eq!(stored.last_reset_date, Some(day(10)));
		assert_eq!(stored.lifetime_published, 40);
	}

	#[test]
	fn same_day_reads_do_not_reset() {
		let (_store, _clock, tracker) = setup(vec![account("alice", 3, day(10), 3)]);
		assert_eq!(tracker.progress("alice", 3).unwrap().published_today, 3);
		assert!(tracker.progress("alice", 3).unwrap().complete);
	}

	#[test]
	fn record_success_after_midnight_starts_new_day() {
		let (store, clock, tracker) = setup(vec![account("alice", 2, day(10), 2)]);
		clock.advance_days(1);
		let counters = tracker.record_success("alice").unwrap();
		assert_eq!(counters.published_today, 1);
		assert_eq!(counters.lifetime_published, 3);
		assert_eq!(store.account("alice").unwrap().unwrap().last_reset_date, Some(day(11)));
	}

	#[test]
	fn never_reset_account_starts_at_zero() {
		let (_store, _clock, tracker) = setup(vec![Account::new("fresh")]);
		let progress = tracker.progress("fresh", 1).unwrap();
		assert_eq!(progress.published_today, 0);
		assert_eq!(progress.to_string(), "0/1 in progress");
	}

	#[test]
	fn partition_keeps_roster_order() {
		let (_store, _clock, tracker) = setup(vec![
			account("a", 0, day(10), 0),
			account("b", 2, day(10), 2),
			account("c", 2, day(9), 9),
		]);
		let roster = vec![Account::new("a"), Account::new("b"), Account::new("c"), Account::new("unknown")];
		let split = tracker.partition(roster, 2).unwrap();
		let eligible: Vec<_> = split.eligible.iter().map(|a| a.name.as_str()).collect();
		assert_eq!(eligible, ["a", "c", "unknown"]);
		assert_eq!(split.complete.len(), 1);
		assert_eq!(split.complete[0].0, "b");
		assert_eq!(split.complete[0].1.to_string(), "2/2 complete");
	}

	#[test]
	fn concurrent_successes_are_all_counted() {
		let (store, _clock, tracker) = setup(vec![account("alice", 0, day(10), 0)]);
		let tracker = Arc::new(tracker);
		let handles: Vec<_> = (0..16)
			.map(|_| {
				let tracker = Arc::clone(&tracker);
				std::thread::spawn(move || tracker.record_success("alice").unwrap())
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		let stored = store.account("alice").unwrap().unwrap();
		assert_eq!(stored.published_today, 16);
		assert_eq!(stored.lifetime_published, 16);
	}

	#[test]
	fn unknown_account_is_an_error() {
		let (_store, _clock, tracker) = setup(vec![]);
		assert!(tracker.progress("ghost", 1).is_err());
	}
}
