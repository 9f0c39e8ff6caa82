use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(about = "Publish a directory of content items across many accounts")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to ./fanout.json, then the user config dir)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Account and ledger data file, overriding the config
	#[arg(long, global = true, value_name = "FILE")]
	pub data_file: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Publish every pending item in the content directory
	Run(RunArgs),

	/// List pending items and whether the ledger already has them
	Scan {
		/// Content directory, overriding the config
		#[arg(value_name = "DIR")]
		content_dir: Option<PathBuf>,
		/// Print JSON instead of a table
		#[arg(long)]
		json: bool,
	},

	/// Manage the account roster
	Accounts {
		#[command(subcommand)]
		action: AccountsAction,
	},

	/// Inspect the published-content ledger
	Ledger {
		#[command(subcommand)]
		action: LedgerAction,
	},

	/// Check driver tiers, port assignments and the reserved health-check port
	Doctor {
		/// Also start and tear down one health-check session
		#[arg(long)]
		preflight: bool,
		#[arg(long)]
		json: bool,
	},
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
	/// Content directory, overriding the config
	#[arg(value_name = "DIR")]
	pub content_dir: Option<PathBuf>,

	/// Maximum number of accounts working at once
	#[arg(short = 'j', long)]
	pub concurrency: Option<usize>,

	/// Successful publications per account per day
	#[arg(short, long)]
	pub target: Option<u32>,

	/// Items a single account may take in this run
	#[arg(long)]
	pub cap: Option<u32>,

	/// Restrict the run to these accounts (repeatable)
	#[arg(short, long = "account", value_name = "NAME")]
	pub accounts: Vec<String>,

	/// Start one health-check session before dispatching work
	#[arg(long)]
	pub preflight: bool,

	/// Show the browser windows
	#[arg(long)]
	pub headed: bool,

	/// Print the summary as JSON
	#[arg(long)]
	pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum AccountsAction {
	/// Show every account with its status and today's progress
	List {
		#[arg(long)]
		json: bool,
	},

	/// Register a new account
	Add {
		name: String,
		/// Cookie export (JSON list or storage state) to attach
		#[arg(long, value_name = "FILE")]
		cookies: Option<PathBuf>,
	},

	/// Delete an account
	Remove { name: String },

	/// Replace an account's stored credentials from a cookie export
	ImportCookies {
		name: String,
		#[arg(value_name = "FILE")]
		file: PathBuf,
	},

	/// Include the account in runs again
	Enable { name: String },

	/// Exclude the account from runs
	Disable { name: String },

	/// Today's progress against the daily target
	Progress {
		#[arg(short, long)]
		target: Option<u32>,
		#[arg(long)]
		json: bool,
	},
}

#[derive(Subcommand, Debug)]
pub enum LedgerAction {
	/// Totals per account and for today
	Stats {
		#[arg(long)]
		json: bool,
	},

	/// List ledger entries, newest first
	Show {
		/// Only entries published by this account
		#[arg(long)]
		account: Option<String>,
		/// Maximum entries to print
		#[arg(short = 'n', long, default_value = "20")]
		limit: usize,
		#[arg(long)]
		json: bool,
	},
}
