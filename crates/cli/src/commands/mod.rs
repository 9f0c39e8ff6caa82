//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use fanout::clock::SystemClock;
use fanout::store::Store;
use fanout::{AccountQuotaTracker, ContentHashStore};

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::store::JsonStore;

pub mod accounts;
pub mod doctor;
pub mod ledger;
pub mod run;
pub mod scan;

/// Resolved configuration shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
	pub config: Config,
}

impl CommandContext {
	pub fn load(config_path: Option<&Path>, data_file: Option<PathBuf>) -> Result<Self> {
		let mut config = Config::load(config_path)?;
		if let Some(path) = data_file {
			config.data_file = path;
		}
		Ok(Self { config })
	}

	pub fn open_store(&self) -> Result<Arc<JsonStore>> {
		Ok(Arc::new(JsonStore::open(&self.config.data_file)?))
	}

	pub fn quota(&self, store: Arc<JsonStore>) -> AccountQuotaTracker {
		AccountQuotaTracker::new(store as Arc<dyn Store>, Arc::new(SystemClock))
	}

	pub fn ledger(&self, store: Arc<JsonStore>) -> Result<ContentHashStore> {
		Ok(ContentHashStore::open(store as Arc<dyn Store>, Arc::new(SystemClock))?)
	}
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::load(cli.config.as_deref(), cli.data_file)?;

	match cli.command {
		Commands::Run(args) => run::execute(&ctx, args).await,
		Commands::Scan { content_dir, json } => scan::execute(&ctx, content_dir, json),
		Commands::Accounts { action } => accounts::execute(&ctx, action),
		Commands::Ledger { action } => ledger::execute(&ctx, action),
		Commands::Doctor { preflight, json } => doctor::execute(&ctx, preflight, json).await,
	}
}

/// Pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
