//! `fanout.json` configuration.
//!
//! Looked up at `--config`, then `./fanout.json`, then
//! `<config dir>/fanout/config.json`. A missing file means defaults; every
//! field is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fanout::{DEFAULT_REFERENCE_PATTERN, ReferencePattern, RunSettings, SessionSettings};
use fanout_runtime::{DEFAULT_BASE_PORT, PortAllocatorConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "fanout.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
	pub content_dir: PathBuf,
	pub data_file: PathBuf,
	pub concurrency: usize,
	pub daily_target: u32,
	/// Items one account may take per run. Defaults to `daily_target`.
	pub per_account_cap: Option<u32>,
	pub extensions: Vec<String>,
	pub reference_pattern: String,
	pub preflight: bool,
	pub session: SessionConfig,
	pub catalog: CatalogConfig,
	/// JSON publish flow; without one a run can only validate.
	pub flow_file: Option<PathBuf>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			content_dir: PathBuf::from("content"),
			data_file: PathBuf::from("fanout-data.json"),
			concurrency: 2,
			daily_target: 10,
			per_account_cap: None,
			extensions: ["mp4", "avi", "mov", "mkv", "flv", "wmv"].into_iter().map(String::from).collect(),
			reference_pattern: DEFAULT_REFERENCE_PATTERN.to_string(),
			preflight: false,
			session: SessionConfig::default(),
			catalog: CatalogConfig::default(),
			flow_file: None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	pub home_url: Option<String>,
	pub entry_url: Option<String>,
	pub headless: bool,
	/// Driver shipped next to the binary.
	pub bundled_driver: PathBuf,
	/// Zip archive containing a driver, fetched when no local driver works.
	pub driver_download_url: Option<String>,
	pub driver_cache_dir: Option<PathBuf>,
	/// Browser binary handed to the driver; the driver's own lookup otherwise.
	pub browser_binary: Option<PathBuf>,
	/// Parent directory for per-account browser profiles.
	pub profile_root: Option<PathBuf>,
	pub wait_timeout_secs: u64,
	pub base_port: u16,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			home_url: None,
			entry_url: None,
			headless: false,
			bundled_driver: PathBuf::from("drivers").join(driver_file_name()),
			driver_download_url: None,
			driver_cache_dir: None,
			browser_binary: None,
			profile_root: None,
			wait_timeout_secs: 30,
			base_port: DEFAULT_BASE_PORT,
		}
	}
}

impl SessionConfig {
	pub fn wait_timeout(&self) -> Duration {
		Duration::from_secs(self.wait_timeout_secs)
	}

	/// Cache directory for fetched drivers.
	pub fn driver_cache(&self) -> PathBuf {
		self.driver_cache_dir
			.clone()
			.or_else(|| dirs::cache_dir().map(|dir| dir.join("fanout").join("drivers")))
			.unwrap_or_else(|| PathBuf::from(".fanout").join("drivers"))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
	/// Lookup endpoint. Without one every reference is accepted.
	pub endpoint: Option<String>,
	/// URL sent to the catalog; `{reference}` is replaced by the reference id.
	pub reference_url_template: String,
	/// Selection-cart endpoint; accepted references are added there before publishing.
	pub cart_endpoint: Option<String>,
	pub timeout_secs: u64,
}

impl Default for CatalogConfig {
	fn default() -> Self {
		Self {
			endpoint: None,
			reference_url_template: "https://item.jd.com/{reference}.html".to_string(),
			cart_endpoint: None,
			timeout_secs: 30,
		}
	}
}

pub fn driver_file_name() -> &'static str {
	if cfg!(windows) { "chromedriver.exe" } else { "chromedriver" }
}

impl Config {
	/// Loads the first config file found, or defaults.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		if let Some(path) = explicit {
			return Self::from_file(path);
		}
		for candidate in default_locations() {
			if candidate.is_file() {
				return Self::from_file(&candidate);
			}
		}
		debug!(target: "fanout", "no config file found; using defaults");
		Ok(Self::default())
	}

	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
		let config: Config = serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
		debug!(target: "fanout", path = %path.display(), "config loaded");
		Ok(config)
	}

	pub fn reference_pattern(&self) -> Result<ReferencePattern> {
		Ok(ReferencePattern::new(&self.reference_pattern)?)
	}

	pub fn per_account_cap(&self) -> u32 {
		self.per_account_cap.unwrap_or(self.daily_target)
	}

	pub fn run_settings(&self) -> RunSettings {
		RunSettings {
			daily_target: self.daily_target,
			preflight: self.preflight,
			..RunSettings::default()
		}
	}

	pub fn session_settings(&self) -> SessionSettings {
		SessionSettings {
			home_url: self.session.home_url.clone(),
			entry_url: self.session.entry_url.clone(),
			headless: self.session.headless,
			profile_root: self.session.profile_root.clone(),
		}
	}

	pub fn port_config(&self) -> PortAllocatorConfig {
		PortAllocatorConfig {
			base: self.session.base_port,
			..PortAllocatorConfig::default()
		}
	}
}

fn default_locations() -> Vec<PathBuf> {
	let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
	if let Some(dir) = dirs::config_dir() {
		locations.push(dir.join("fanout").join("config.json"));
	}
	locations
}
