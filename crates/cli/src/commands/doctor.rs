//! `fanout doctor`: environment checks before a run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use colored::Colorize;
use fanout::SessionManager;
use fanout::store::Store;
use fanout_runtime::{PortAllocator, port_available};
use serde::Serialize;

use super::{CommandContext, print_json};
use crate::webdriver::{DriverTier, driver_launchers, locate_driver};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TierCheck {
	tier: DriverTier,
	path: Option<PathBuf>,
	error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PortCheck {
	account: String,
	port: u16,
	free: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorReport {
	tiers: Vec<TierCheck>,
	reserved_port: u16,
	reserved_free: bool,
	ports: Vec<PortCheck>,
	preflight: Option<String>,
}

pub async fn execute(ctx: &CommandContext, preflight: bool, json: bool) -> Result<()> {
	let config = &ctx.config;
	let store = ctx.open_store()?;

	let tiers: Vec<TierCheck> = DriverTier::ALL
		.into_iter()
		.map(|tier| match locate_driver(tier, &config.session) {
			Ok(path) => TierCheck {
				tier,
				path: Some(path),
				error: None,
			},
			Err(err) => TierCheck {
				tier,
				path: None,
				error: Some(format!("{err:#}")),
			},
		})
		.collect();

	let allocator = Arc::new(PortAllocator::with_probe(config.port_config(), port_available));
	let active: Vec<String> = store.accounts()?.into_iter().filter(|a| a.is_active()).map(|a| a.name).collect();
	allocator.set_roster(active.iter().cloned());
	let ports = active
		.into_iter()
		.map(|account| {
			let port = allocator.preferred_port(&account);
			PortCheck {
				account,
				port,
				free: port_available(port),
			}
		})
		.collect();

	let mut report = DoctorReport {
		tiers,
		reserved_port: allocator.reserved(),
		reserved_free: port_available(allocator.reserved()),
		ports,
		preflight: None,
	};

	let mut preflight_error = None;
	if preflight {
		let manager = SessionManager::new(
			driver_launchers(Arc::new(config.session.clone()))?,
			allocator,
			store as Arc<dyn Store>,
			config.session_settings(),
		);
		match manager.preflight().await {
			Ok(tier) => report.preflight = Some(tier),
			Err(err) => preflight_error = Some(err),
		}
	}

	if json {
		print_json(&report)?;
	} else {
		print_report(&report);
	}

	if let Some(err) = preflight_error {
		bail!("preflight failed: {err}");
	}
	if report.tiers.iter().all(|check| check.path.is_none()) && config.session.driver_download_url.is_none() {
		bail!("no driver tier is usable");
	}
	Ok(())
}

fn print_report(report: &DoctorReport) {
	println!("{}", "Driver tiers".bold());
	for check in &report.tiers {
		match (&check.path, &check.error) {
			(Some(path), _) => println!("  {} {:<8} {}", "ok".green(), check.tier, path.display()),
			(None, Some(err)) => println!("  {} {:<8} {err}", "--".yellow(), check.tier),
			(None, None) => println!("  {} {:<8}", "--".yellow(), check.tier),
		}
	}

	let reserved = if report.reserved_free { "free".green() } else { "in use".red() };
	println!("{} {} ({reserved})", "Reserved port".bold(), report.reserved_port);

	println!("{}", "Account ports".bold());
	if report.ports.is_empty() {
		println!("  no active accounts");
	}
	for check in &report.ports {
		let state = if check.free { "free".green() } else { "in use".yellow() };
		println!("  {:<20} {:>5} {state}", check.account, check.port);
	}

	if let Some(tier) = &report.preflight {
		println!("{} passed with the {tier} tier", "Preflight".bold());
	}
}
