//! `fanout ledger`: reporting over published content.

use anyhow::Result;
use colored::Colorize;
use fanout::store::Store;
use fanout_protocol::LedgerEntry;

use super::{CommandContext, print_json};
use crate::cli::LedgerAction;

pub fn execute(ctx: &CommandContext, action: LedgerAction) -> Result<()> {
	let store = ctx.open_store()?;

	match action {
		LedgerAction::Stats { json } => {
			let stats = ctx.ledger(store)?.statistics()?;
			if json {
				return print_json(&stats);
			}
			println!("{} entries, {} today, {} source files deleted", stats.total, stats.today, stats.deleted);
			for (account, count) in &stats.per_account {
				println!("  {:<20} {count}", account);
			}
			Ok(())
		}
		LedgerAction::Show { account, limit, json } => {
			let entries = newest_first(store.ledger_entries()?, account.as_deref(), limit);
			if json {
				return print_json(&entries);
			}
			if entries.is_empty() {
				println!("Ledger is empty");
				return Ok(());
			}
			for entry in entries {
				let file = if entry.deleted { entry.filename.dimmed() } else { entry.filename.normal() };
				println!("{}  {:<16} {:<14} {file}", entry.processed_on, entry.account, entry.reference);
			}
			Ok(())
		}
	}
}

/// Entries sorted by day (newest first), optionally for one account.
fn newest_first(mut entries: Vec<LedgerEntry>, account: Option<&str>, limit: usize) -> Vec<LedgerEntry> {
	if let Some(account) = account {
		entries.retain(|entry| entry.account == account);
	}
	entries.sort_by(|a, b| b.processed_on.cmp(&a.processed_on).then_with(|| a.filename.cmp(&b.filename)));
	entries.truncate(limit);
	entries
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	fn entry(file: &str, account: &str, day: u32) -> LedgerEntry {
		LedgerEntry {
			digest: format!("sha256:{file}"),
			filename: file.to_string(),
			account: account.to_string(),
			reference: "1".to_string(),
			processed_on: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
			size: 1,
			deleted: false,
		}
	}

	#[test]
	fn sorts_newest_first_and_limits() {
		let entries = vec![entry("a.mp4", "alice", 1), entry("b.mp4", "bob", 3), entry("c.mp4", "alice", 2)];
		let shown: Vec<String> = newest_first(entries, None, 2).into_iter().map(|e| e.filename).collect();
		assert_eq!(shown, ["b.mp4", "c.mp4"]);
	}

	#[test]
	fn filters_by_account() {
		let entries = vec![entry("a.mp4", "alice", 1), entry("b.mp4", "bob", 3), entry("c.mp4", "alice", 2)];
		let shown: Vec<String> = newest_first(entries, Some("alice"), 10).into_iter().map(|e| e.filename).collect();
		assert_eq!(shown, ["c.mp4", "a.mp4"]);
	}
}
