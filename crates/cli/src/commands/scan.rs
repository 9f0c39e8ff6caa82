//! `fanout scan`: what a run would pick up.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use fanout::discover;
use fanout::store::Store;
use serde::Serialize;

use super::{CommandContext, print_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanRow {
	file: String,
	reference: Option<String>,
	digest: String,
	size: u64,
	/// Account that already published this content, if any.
	published_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
	content_dir: PathBuf,
	pending: usize,
	items: Vec<ScanRow>,
	skipped: Vec<SkippedRow>,
}

#[derive(Debug, Serialize)]
struct SkippedRow {
	file: String,
	reason: String,
}

pub fn execute(ctx: &CommandContext, content_dir: Option<PathBuf>, json: bool) -> Result<()> {
	let content_dir = content_dir.unwrap_or_else(|| ctx.config.content_dir.clone());
	let store = ctx.open_store()?;
	let discovery = discover(&content_dir, &ctx.config.extensions, &ctx.config.reference_pattern()?)?;

	let mut items = Vec::with_capacity(discovery.items.len());
	for item in discovery.items {
		let published_by = store.ledger_entry(&item.digest)?.map(|entry| entry.account);
		items.push(ScanRow {
			file: item.file_name(),
			reference: item.reference,
			digest: item.digest,
			size: item.size,
			published_by,
		});
	}
	let report = ScanReport {
		pending: items.iter().filter(|row| row.published_by.is_none()).count(),
		content_dir,
		items,
		skipped: discovery
			.skipped
			.into_iter()
			.map(|(path, reason)| SkippedRow {
				file: path.display().to_string(),
				reason,
			})
			.collect(),
	};

	if json {
		return print_json(&report);
	}

	println!("{} ({} pending of {})", report.content_dir.display(), report.pending, report.items.len());
	for row in &report.items {
		let reference = row.reference.as_deref().unwrap_or("-");
		let state = match &row.published_by {
			Some(account) => format!("published by {account}").dimmed(),
			None if row.reference.is_none() => "no reference".yellow(),
			None => "pending".green(),
		};
		println!("  {:<40} {:<14} {state}", row.file, reference);
	}
	for skipped in &report.skipped {
		println!("  {} {} ({})", "skipped".dimmed(), skipped.file, skipped.reason);
	}
	Ok(())
}
