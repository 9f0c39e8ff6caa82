//! Driver executable discovery and on-demand download.

use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{SessionConfig, driver_file_name};

/// Where a driver executable comes from, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverTier {
	/// Shipped next to the binary.
	Bundled,
	/// Found on `PATH`.
	Host,
	/// Downloaded into the cache directory.
	Fetched,
}

impl DriverTier {
	pub const ALL: [DriverTier; 3] = [Self::Bundled, Self::Host, Self::Fetched];

	pub fn name(self) -> &'static str {
		match self {
			Self::Bundled => "bundled",
			Self::Host => "host",
			Self::Fetched => "fetched",
		}
	}
}

impl fmt::Display for DriverTier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Finds the driver for `tier` without downloading anything.
pub fn locate_driver(tier: DriverTier, config: &SessionConfig) -> Result<PathBuf> {
	match tier {
		DriverTier::Bundled => {
			let path = resolve_bundled(&config.bundled_driver);
			if path.is_file() {
				Ok(path)
			} else {
				bail!("no bundled driver at {}", path.display())
			}
		}
		DriverTier::Host => which::which(driver_file_name()).map_err(|e| anyhow!("{} not on PATH: {e}", driver_file_name())),
		DriverTier::Fetched => {
			let path = config.driver_cache().join(driver_file_name());
			if path.is_file() {
				Ok(path)
			} else {
				bail!("no cached driver at {}", path.display())
			}
		}
	}
}

/// Relative bundled paths are tried next to the executable first, then the working directory.
fn resolve_bundled(path: &Path) -> PathBuf {
	if path.is_absolute() {
		return path.to_path_buf();
	}
	let beside_exe = std::env::current_exe()
		.ok()
		.and_then(|exe| exe.parent().map(|dir| dir.join(path)))
		.filter(|candidate| candidate.is_file());
	beside_exe.unwrap_or_else(|| path.to_path_buf())
}

/// Downloads the configured driver archive into the cache unless a copy is already there.
pub async fn fetch_driver(config: &SessionConfig) -> Result<PathBuf> {
	if let Ok(path) = locate_driver(DriverTier::Fetched, config) {
		return Ok(path);
	}
	let url = config
		.driver_download_url
		.as_deref()
		.ok_or_else(|| anyhow!("no driverDownloadUrl configured"))?;
	url::Url::parse(url).with_context(|| format!("Invalid driver download URL {url}"))?;

	info!(target: "fanout.webdriver", %url, "downloading driver");
	let response = reqwest::get(url).await.with_context(|| format!("Failed to download {url}"))?;
	if !response.status().is_success() {
		bail!("driver download returned HTTP {}", response.status());
	}
	let bytes = response.bytes().await.context("Failed to read driver archive")?;

	let cache = config.driver_cache();
	let path = extract_driver(&bytes, &cache)?;
	info!(target: "fanout.webdriver", path = %path.display(), "driver cached");
	Ok(path)
}

/// Extracts the driver executable from a zip archive into `dir`.
pub(crate) fn extract_driver(archive: &[u8], dir: &Path) -> Result<PathBuf> {
	let mut zip = zip::ZipArchive::new(Cursor::new(archive)).context("Driver download is not a zip archive")?;
	let wanted = driver_file_name();

	for index in 0..zip.len() {
		let mut entry = zip.by_index(index)?;
		if entry.is_dir() {
			continue;
		}
		let Some(name) = entry.enclosed_name() else {
			continue;
		};
		if name.file_name().and_then(|n| n.to_str()) != Some(wanted) {
			continue;
		}

		let mut contents = Vec::with_capacity(entry.size() as usize);
		entry.read_to_end(&mut contents)?;
		fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
		let target = dir.join(wanted);
		fs::write(&target, &contents).with_context(|| format!("Failed to write {}", target.display()))?;
		make_executable(&target)?;
		debug!(target: "fanout.webdriver", from = %name.display(), to = %target.display(), "driver extracted");
		return Ok(target);
	}

	bail!("archive does not contain {wanted}")
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
	use std::os::unix::fs::PermissionsExt;
	let mut perms = fs::metadata(path)?.permissions();
	perms.set_mode(0o755);
	fs::set_permissions(path, perms)?;
	Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
	Ok(())
}
