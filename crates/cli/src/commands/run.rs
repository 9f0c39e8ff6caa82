//! `fanout run`: one batch run over the content directory.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use fanout::store::Store;
use fanout::{RunContext, RunState, RunSummary, Scheduler, WorkerExit, discover};
use fanout_protocol::Account;
use fanout_runtime::{PortAllocator, port_available};
use tracing::{info, warn};

use super::{CommandContext, print_json};
use crate::catalog::HttpCatalog;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::flow::ScriptedFlow;
use crate::observer::TracingObserver;
use crate::webdriver::driver_launchers;

pub async fn execute(ctx: &CommandContext, args: RunArgs) -> Result<()> {
	let mut config = ctx.config.clone();
	apply_overrides(&mut config, &args);

	let store = ctx.open_store()?;
	let roster = select_roster(store.accounts()?, &args.accounts)?;

	let pattern = config.reference_pattern()?;
	let discovery = discover(&config.content_dir, &config.extensions, &pattern)?;
	for (path, reason) in &discovery.skipped {
		warn!(target: "fanout.items", path = %path.display(), %reason, "file skipped");
	}
	if discovery.items.is_empty() {
		println!("Nothing to publish in {}", config.content_dir.display());
		return Ok(());
	}

	let flow_file = config
		.flow_file
		.clone()
		.context("No flow file configured; set `flowFile` in the config")?;
	let flow = ScriptedFlow::from_file(&flow_file, config.session.wait_timeout())?;
	if config.session.entry_url.is_none() {
		config.session.entry_url = flow.definition().entry_url.clone();
	}

	let session_config = Arc::new(config.session.clone());
	let allocator = Arc::new(PortAllocator::with_probe(config.port_config(), port_available));
	let mut builder = RunContext::builder(store.clone() as Arc<dyn Store>, Arc::new(flow))
		.with_observer(Arc::new(TracingObserver))
		.with_launchers(driver_launchers(session_config)?)
		.with_allocator(allocator)
		.with_session_settings(config.session_settings())
		.with_settings(config.run_settings());
	match &config.catalog.endpoint {
		Some(endpoint) => builder = builder.with_validator(Arc::new(HttpCatalog::new(endpoint.as_str(), &config.catalog)?)),
		None => warn!(target: "fanout", "no catalog endpoint configured; every reference will be accepted"),
	}
	let run_ctx = builder.build()?;

	info!(
		target: "fanout",
		accounts = roster.len(),
		items = discovery.items.len(),
		concurrency = config.concurrency,
		"starting run"
	);
	let handle = Scheduler::new(run_ctx).start(roster, discovery.items, config.concurrency, config.per_account_cap());

	let stop = handle.stop_signal();
	let interrupt = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!(target: "fanout", "interrupt received; finishing items in flight");
			stop.stop();
		}
	});
	let summary = handle.join().await;
	interrupt.abort();
	let summary = summary?;

	if args.json {
		print_json(&summary)?;
	} else {
		print_summary(&summary);
	}

	if !summary.unreconciled.is_empty() {
		bail!("{} published item(s) are missing from the ledger", summary.unreconciled.len());
	}
	Ok(())
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
	if let Some(dir) = &args.content_dir {
		config.content_dir = dir.clone();
	}
	if let Some(concurrency) = args.concurrency {
		config.concurrency = concurrency;
	}
	if let Some(target) = args.target {
		config.daily_target = target;
	}
	if let Some(cap) = args.cap {
		config.per_account_cap = Some(cap);
	}
	if args.preflight {
		config.preflight = true;
	}
	if args.headed {
		config.session.headless = false;
	}
}

/// Active accounts in stored order, narrowed to `only` when given.
fn select_roster(accounts: Vec<Account>, only: &[String]) -> Result<Vec<Account>> {
	for name in only {
		if !accounts.iter().any(|a| &a.name == name) {
			bail!("unknown account '{name}'");
		}
	}
	let roster: Vec<Account> = accounts
		.into_iter()
		.filter(|a| a.is_active())
		.filter(|a| only.is_empty() || only.contains(&a.name))
		.collect();
	if roster.is_empty() {
		bail!("No active accounts to run with");
	}
	Ok(roster)
}

fn print_summary(summary: &RunSummary) {
	let state = match summary.state {
		RunState::Finished => "finished".green(),
		RunState::Stopped => "stopped".yellow(),
		other => other.to_string().normal(),
	};
	println!("Run {state}: {}/{} items processed, {} published", summary.processed, summary.total, summary.succeeded);
	if summary.already_published > 0 {
		println!("  {} already in the ledger", summary.already_published);
	}
	if summary.discarded > 0 {
		println!("  {} discarded", summary.discarded);
	}
	if summary.remaining > 0 {
		println!("  {} left in the queue", summary.remaining);
	}
	for name in &summary.completed_accounts {
		println!("  {} {name}: target already met", "-".dimmed());
	}
	for report in &summary.accounts {
		let marker = match report.exit {
			WorkerExit::Failed(_) => "x".red(),
			WorkerExit::Stopped => "-".yellow(),
			_ => "+".green(),
		};
		println!(
			"  {marker} {}: {} published, {} discarded, {} deferred ({})",
			report.account, report.succeeded, report.discarded, report.deferred, report.exit
		);
	}
	for path in &summary.unreconciled {
		println!("  {} not recorded in ledger: {}", "!".red(), path.display());
	}
}

#[cfg(test)]
mod tests {
	use fanout_protocol::AccountStatus;

	use super::*;

	fn roster() -> Vec<Account> {
		let mut bob = Account::new("bob");
		bob.status = AccountStatus::Inactive;
		vec![Account::new("alice"), bob, Account::new("carol")]
	}

	#[test]
	fn roster_skips_inactive_accounts() {
		let names: Vec<String> = select_roster(roster(), &[]).unwrap().into_iter().map(|a| a.name).collect();
		assert_eq!(names, ["alice", "carol"]);
	}

	#[test]
	fn roster_filter_keeps_stored_order() {
		let only = vec!["carol".to_string(), "alice".to_string()];
		let names: Vec<String> = select_roster(roster(), &only).unwrap().into_iter().map(|a| a.name).collect();
		assert_eq!(names, ["alice", "carol"]);
	}

	#[test]
	fn unknown_or_inactive_only_roster_is_an_error() {
		assert!(select_roster(roster(), &["dave".to_string()]).is_err());
		assert!(select_roster(roster(), &["bob".to_string()]).is_err());
	}

	#[test]
	fn overrides_replace_config_values() {
		let mut config = Config::default();
		let args = RunArgs {
			concurrency: Some(4),
			target: Some(3),
			cap: Some(1),
			headed: true,
			..RunArgs::default()
		};
		apply_overrides(&mut config, &args);
		assert_eq!(config.concurrency, 4);
		assert_eq!(config.daily_target, 3);
		assert_eq!(config.per_account_cap(), 1);
		assert!(!config.session.headless);
	}
}
