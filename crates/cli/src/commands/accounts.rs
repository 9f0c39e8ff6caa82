//! Account roster management.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use fanout::store::Store;
use fanout_protocol::{Account, AccountStatus, Cookie};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CommandContext, print_json};
use crate::cli::AccountsAction;

pub fn execute(ctx: &CommandContext, action: AccountsAction) -> Result<()> {
	let store = ctx.open_store()?;

	match action {
		AccountsAction::List { json } => {
			let accounts = store.accounts()?;
			let names: Vec<String> = accounts.iter().map(|a| a.name.clone()).collect();
			let progress = ctx.quota(store.clone()).batch_progress(&names, ctx.config.daily_target)?;
			let rows: Vec<AccountRow> = accounts
				.iter()
				.map(|account| AccountRow {
					name: account.name.clone(),
					status: account.status,
					progress: progress.get(&account.name).map(ToString::to_string).unwrap_or_default(),
					lifetime: account.lifetime_published,
					cookies: account.credentials.len(),
					port: account.assigned_port,
				})
				.collect();
			if json {
				return print_json(&rows);
			}
			if rows.is_empty() {
				println!("No accounts. Add one with `fanout accounts add <name>`.");
				return Ok(());
			}
			println!("{:<20} {:<9} {:<18} {:>8} {:>7}", "ACCOUNT".bold(), "STATUS".bold(), "TODAY".bold(), "LIFETIME".bold(), "COOKIES".bold());
			for row in rows {
				let status = match row.status {
					AccountStatus::Active => "active".green(),
					AccountStatus::Inactive => "inactive".dimmed(),
				};
				println!("{:<20} {:<9} {:<18} {:>8} {:>7}", row.name, status, row.progress, row.lifetime, row.cookies);
			}
			Ok(())
		}
		AccountsAction::Add { name, cookies } => {
			if store.account(&name)?.is_some() {
				bail!("account '{name}' already exists");
			}
			let mut account = Account::new(&name);
			if let Some(path) = cookies {
				account.credentials = load_cookies(&path)?;
			}
			store.upsert_account(&account)?;
			info!(target: "fanout", account = %name, cookies = account.credentials.len(), "account added");
			println!("{} {name} ({} cookies)", "added".green(), account.credentials.len());
			Ok(())
		}
		AccountsAction::Remove { name } => {
			if !store.remove_account(&name)? {
				bail!("unknown account '{name}'");
			}
			println!("{} {name}", "removed".yellow());
			Ok(())
		}
		AccountsAction::ImportCookies { name, file } => {
			let mut account = existing(store.as_ref(), &name)?;
			account.credentials = load_cookies(&file)?;
			store.upsert_account(&account)?;
			println!("{} {} cookies for {name}", "imported".green(), account.credentials.len());
			Ok(())
		}
		AccountsAction::Enable { name } => set_status(store.as_ref(), &name, AccountStatus::Active),
		AccountsAction::Disable { name } => set_status(store.as_ref(), &name, AccountStatus::Inactive),
		AccountsAction::Progress { target, json } => {
			let target = target.unwrap_or(ctx.config.daily_target);
			let names: Vec<String> = store.accounts()?.into_iter().map(|a| a.name).collect();
			let progress = ctx.quota(store.clone()).batch_progress(&names, target)?;
			let rows: Vec<ProgressRow> = names
				.into_iter()
				.filter_map(|name| {
					let progress = progress.get(&name)?;
					Some(ProgressRow {
						published_today: progress.published_today,
						target,
						complete: progress.complete,
						name,
					})
				})
				.collect();
			if json {
				return print_json(&rows);
			}
			for row in rows {
				let state = if row.complete { "complete".green() } else { "in progress".yellow() };
				println!("{:<20} {}/{} {}", row.name, row.published_today, row.target, state);
			}
			Ok(())
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRow {
	name: String,
	status: AccountStatus,
	progress: String,
	lifetime: u64,
	cookies: usize,
	port: Option<u16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRow {
	name: String,
	published_today: u32,
	target: u32,
	complete: bool,
}

fn existing(store: &dyn Store, name: &str) -> Result<Account> {
	store.account(name)?.with_context(|| format!("unknown account '{name}'"))
}

fn set_status(store: &dyn Store, name: &str, status: AccountStatus) -> Result<()> {
	let mut account = existing(store, name)?;
	account.status = status;
	store.upsert_account(&account)?;
	let label = match status {
		AccountStatus::Active => "enabled".green(),
		AccountStatus::Inactive => "disabled".yellow(),
	};
	println!("{label} {name}");
	Ok(())
}

/// Storage-state export. Unlike [`fanout_protocol::StorageState`], `cookies` is required here.
#[derive(Deserialize)]
struct CookieState {
	cookies: Vec<Cookie>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CookieExport {
	List(Vec<Cookie>),
	State(CookieState),
}

/// Reads a cookie list or a storage-state export.
pub fn load_cookies(path: &Path) -> Result<Vec<Cookie>> {
	let raw = fs::read_to_string(path).with_context(|| format!("Failed to read cookies from {}", path.display()))?;
	let export: CookieExport = serde_json::from_str(&raw).with_context(|| format!("{} is not a cookie export", path.display()))?;
	let cookies = match export {
		CookieExport::List(cookies) => cookies,
		CookieExport::State(state) => state.cookies,
	};
	if cookies.is_empty() {
		bail!("{} contains no cookies", path.display());
	}
	Ok(cookies)
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn loads_both_cookie_layouts() {
		let temp = TempDir::new().unwrap();
		let list = temp.path().join("list.json");
		fs::write(&list, r#"[{"name":"SESSDATA","value":"x","domain":".example.com"}]"#).unwrap();
		let state = temp.path().join("state.json");
		fs::write(&state, r#"{"cookies":[{"name":"a","value":"1"},{"name":"b","value":"2"}],"origins":[]}"#).unwrap();

		assert_eq!(load_cookies(&list).unwrap()[0].domain.as_deref(), Some(".example.com"));
		assert_eq!(load_cookies(&state).unwrap().len(), 2);
	}

	#[test]
	fn rejects_non_cookie_json() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("bad.json");
		fs::write(&path, r#"{"hello": 1}"#).unwrap();
		assert!(load_cookies(&path).is_err());

		fs::write(&path, r#"{"origins": []}"#).unwrap();
		assert!(load_cookies(&path).is_err());
	}

	#[test]
	fn rejects_empty_exports() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("empty.json");
		fs::write(&path, r#"{"cookies": [], "origins": []}"#).unwrap();
		assert!(load_cookies(&path).is_err());

		fs::write(&path, "[]").unwrap();
		assert!(load_cookies(&path).is_err());
	}
}
