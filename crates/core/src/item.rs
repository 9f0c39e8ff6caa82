//! Content items discovered in the source directory.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{FanoutError, Result};
use crate::ledger::compute_digest;

/// Default item name layout: `<reference digits>----<title>.<ext>`.
pub const DEFAULT_REFERENCE_PATTERN: &str = r"^(\d+)----";
const TITLE_SEPARATOR: &str = "----";

/// Extracts the external reference id from an item's file name.
#[derive(Debug, Clone)]
pub struct ReferencePattern {
	regex: Regex,
}

impl ReferencePattern {
	/// Compiles `pattern`; capture group 1 must hold the reference id.
	pub fn new(pattern: &str) -> Result<Self> {
		let regex = Regex::new(pattern).map_err(|e| FanoutError::Context(format!("Invalid reference pattern '{pattern}': {e}")))?;
		if regex.captures_len() < 2 {
			return Err(FanoutError::Context(format!("Reference pattern '{pattern}' needs a capture group")));
		}
		Ok(Self { regex })
	}

	pub fn extract(&self, file_name: &str) -> Option<String> {
		self.regex
			.captures(file_name)
			.and_then(|caps| caps.get(1))
			.map(|m| m.as_str().to_string())
			.filter(|reference| !reference.is_empty())
	}
}

impl Default for ReferencePattern {
	fn default() -> Self {
		Self {
			regex: Regex::new(DEFAULT_REFERENCE_PATTERN).expect("default reference pattern is valid"),
		}
	}
}

/// One content file pending publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
	pub path: PathBuf,
	pub digest: String,
	pub size: u64,
	/// `None` when the name does not carry a reference id.
	pub reference: Option<String>,
}

impl WorkItem {
	/// Hashes and inspects the file at `path`.
	pub fn from_path(path: &Path, pattern: &ReferencePattern) -> Result<Self> {
		let size = fs::metadata(path)?.len();
		let digest = compute_digest(path)?;
		let reference = pattern.extract(&file_name_of(path));
		Ok(Self {
			path: path.to_path_buf(),
			digest,
			size,
			reference,
		})
	}

	pub fn file_name(&self) -> String {
		file_name_of(&self.path)
	}

	/// Human title: the text after the reference separator, without extension.
	pub fn title(&self) -> String {
		let stem = self.path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
		match stem.split_once(TITLE_SEPARATOR) {
			Some((_, title)) if !title.trim().is_empty() => title.trim().to_string(),
			_ => stem,
		}
	}
}

fn file_name_of(path: &Path) -> String {
	path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

/// Result of scanning a source directory.
#[derive(Debug, Default)]
pub struct Discovery {
	/// Candidate items sorted by file name.
	pub items: Vec<WorkItem>,
	/// Files that were ignored, with the reason.
	pub skipped: Vec<(PathBuf, String)>,
}

/// Scans `dir` (non-recursively) for files whose extension is in `extensions`.
///
/// Extension matching ignores case. Empty files are skipped rather than queued.
pub fn discover(dir: &Path, extensions: &[String], pattern: &ReferencePattern) -> Result<Discovery> {
	let mut paths = Vec::new();
	for entry in fs::read_dir(dir).map_err(|e| FanoutError::Context(format!("Failed to read content dir {}: {e}", dir.display())))? {
		let entry = entry?;
		let path = entry.path();
		if !entry.file_type()?.is_file() {
			continue;
		}
		let matches = path
			.extension()
			.map(|ext| ext.to_string_lossy().to_ascii_lowercase())
			.is_some_and(|ext| extensions.iter().any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext)));
		if matches {
			paths.push(path);
		}
	}
	paths.sort();

	let mut discovery = Discovery::default();
	for path in paths {
		match fs::metadata(&path) {
			Ok(meta) if meta.len() == 0 => {
				debug!(target: "fanout.items", path = %path.display(), "skipping empty file");
				discovery.skipped.push((path, "empty file".to_string()));
			}
			Ok(_) => match WorkItem::from_path(&path, pattern) {
				Ok(item) => discovery.items.push(item),
				Err(err) => {
					warn!(target: "fanout.items", path = %path.display(), error = %err, "failed to hash item");
					discovery.skipped.push((path, err.to_string()));
				}
			},
			Err(err) => discovery.skipped.push((path, err.to_string())),
		}
	}
	Ok(discovery)
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn exts() -> Vec<String> {
		["mp4", ".MOV"].iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn reference_comes_from_leading_digits() {
		let pattern = ReferencePattern::default();
		assert_eq!(pattern.extract("100234----Summer haul.mp4").as_deref(), Some("100234"));
		assert_eq!(pattern.extract("abc----x.mp4"), None);
		assert_eq!(pattern.extract("100234 summer.mp4"), None);
	}

	#[test]
	fn custom_pattern_requires_capture_group() {
		assert!(ReferencePattern::new(r"^\d+").is_err());
		let pattern = ReferencePattern::new(r"^sku-(\w+)_").unwrap();
		assert_eq!(pattern.extract("sku-A12_video.mp4").as_deref(), Some("A12"));
	}

	#[test]
	fn title_strips_reference_and_extension() {
		let item = WorkItem {
			path: PathBuf::from("/tmp/42----Best blender.mp4"),
			digest: String::new(),
			size: 1,
			reference: Some("42".into()),
		};
		assert_eq!(item.title(), "Best blender");

		let plain = WorkItem {
			path: PathBuf::from("/tmp/plain.mp4"),
			..item
		};
		assert_eq!(plain.title(), "plain");
	}

	#[test]
	fn discover_filters_sorts_and_skips_empty() {
		let temp = TempDir::new().unwrap();
		fs::write(temp.path().join("2----b.mp4"), b"bbb").unwrap();
		fs::write(temp.path().join("1----a.MP4"), b"aaa").unwrap();
		fs::write(temp.path().join("3----c.mov"), b"").unwrap();
		fs::write(temp.path().join("notes.txt"), b"x").unwrap();
		fs::create_dir(temp.path().join("nested.mp4")).unwrap();

		let found = discover(temp.path(), &exts(), &ReferencePattern::default()).unwrap();
		let names: Vec<_> = found.items.iter().map(WorkItem::file_name).collect();
		assert_eq!(names, ["1----a.MP4", "2----b.mp4"]);
		assert_eq!(found.items[0].reference.as_deref(), Some("1"));
		assert_eq!(found.items[0].size, 3);
		assert!(found.items[0].digest.starts_with("sha256:"));
		assert_eq!(found.skipped.len(), 1);
		assert_eq!(found.skipped[0].1, "empty file");
	}

	#[test]
	fn discover_missing_dir_is_an_error() {
		let err = discover(Path::new("/definitely/missing"), &exts(), &ReferencePattern::default()).unwrap_err();
		assert!(err.to_string().contains("Failed to read content dir"));
	}
}
