//! Per-worker reports and the final run summary.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::RunState;

/// Why a worker stopped pulling items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WorkerExit {
	/// Quota was already met when the worker started.
	AlreadyComplete,
	QuotaMet,
	CapReached,
	QueueEmpty,
	Stopped,
	Failed(String),
}

impl fmt::Display for WorkerExit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::AlreadyComplete => f.write_str("already complete"),
			Self::QuotaMet => f.write_str("daily target reached"),
			Self::CapReached => f.write_str("per-run cap reached"),
			Self::QueueEmpty => f.write_str("queue empty"),
			Self::Stopped => f.write_str("stopped"),
			Self::Failed(reason) => write!(f, "failed: {reason}"),
		}
	}
}

/// What one account's worker did during the run.
#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
	pub account: String,
	pub processed: usize,
	pub succeeded: usize,
	pub discarded: usize,
	pub deferred: usize,
	pub already_published: usize,
	pub exit: WorkerExit,
	/// Items whose publication could not be recorded in the ledger.
	pub unreconciled: Vec<PathBuf>,
}

impl AccountReport {
	pub fn new(account: impl Into<String>) -> Self {
		Self {
			account: account.into(),
			processed: 0,
			succeeded: 0,
			discarded: 0,
			deferred: 0,
			already_published: 0,
			exit: WorkerExit::QueueEmpty,
			unreconciled: Vec::new(),
		}
	}
}

/// An account that failed during the run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AccountFailure {
	pub account: String,
	pub reason: String,
}

/// Totals for one batch run. Only complete after every worker was joined.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
	pub state: RunState,
	/// Items queued at start (ledger hits excluded).
	pub total: usize,
	pub processed: usize,
	pub succeeded: usize,
	pub discarded: usize,
	pub deferred: usize,
	/// Items skipped because their digest was already in the ledger.
	pub already_published: usize,
	/// Items still queued when the run ended.
	pub remaining: usize,
	/// Accounts that had met their target before the run started.
	pub completed_accounts: Vec<String>,
	pub accounts: Vec<AccountReport>,
	pub errored: Vec<AccountFailure>,
	pub unreconciled: Vec<PathBuf>,
}

impl RunSummary {
	pub(crate) fn new(total: usize, already_published: usize) -> Self {
		Self {
			state: RunState::Running,
			total,
			processed: 0,
			succeeded: 0,
			discarded: 0,
			deferred: 0,
			already_published,
			remaining: total,
			completed_accounts: Vec::new(),
			accounts: Vec::new(),
			errored: Vec::new(),
			unreconciled: Vec::new(),
		}
	}

	pub(crate) fn absorb(&mut self, report: AccountReport) {
		self.processed += report.processed;
		self.succeeded += report.succeeded;
		self.discarded += report.discarded;
		self.deferred += report.deferred;
		self.already_published += report.already_published;
		self.unreconciled.extend(report.unreconciled.iter().cloned());
		if let WorkerExit::Failed(reason) = &report.exit {
			self.errored.push(AccountFailure {
				account: report.account.clone(),
				reason: reason.clone(),
			});
		}
		self.accounts.push(report);
	}

	pub(crate) fn record_failure(&mut self, account: &str, reason: String) {
		let mut report = AccountReport::new(account);
		report.exit = WorkerExit::Failed(reason);
		self.absorb(report);
	}

	pub fn report(&self, account: &str) -> Option<&AccountReport> {
		self.accounts.iter().find(|r| r.account == account)
	}

	pub fn is_clean(&self) -> bool {
		self.errored.is_empty() && self.unreconciled.is_empty()
	}
}

impl fmt::Display for RunSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}: processed {} item(s), {} published, {} discarded, {} deferred, {} remaining",
			self.state, self.processed, self.succeeded, self.discarded, self.deferred, self.remaining
		)?;
		if !self.errored.is_empty() {
			let names: Vec<_> = self.errored.iter().map(|e| e.account.as_str()).collect();
			write!(f, "; errored accounts: {}", names.join(", "))?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn absorb_tracks_failed_accounts_by_name() {
		let mut summary = RunSummary::new(5, 1);
		let mut ok = AccountReport::new("alice");
		ok.processed = 2;
		ok.succeeded = 2;
		summary.absorb(ok);
		summary.record_failure("bob", "no driver".into());
		summary.state = RunState::Finished;
		summary.remaining = 3;

		assert_eq!(summary.succeeded, 2);
		assert_eq!(summary.errored, [AccountFailure {
			account: "bob".into(),
			reason: "no driver".into()
		}]);
		assert!(!summary.is_clean());
		assert_eq!(
			summary.to_string(),
			"finished: processed 2 item(s), 2 published, 0 discarded, 0 deferred, 3 remaining; errored accounts: bob"
		);
	}
}
