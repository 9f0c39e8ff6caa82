//! Exclusive per-account port assignment.
//!
//! Each account's session gets its own driver port. The mapping is derived
//! from the account's roster position when known so that the same account
//! lands on the same port across restarts; otherwise a stable name hash picks
//! a slot in a small fallback window. Collisions probe forward through the
//! window, so assignments stay injective across live sessions.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Default reserved port for the tooling health-check session.
pub const DEFAULT_RESERVED_PORT: u16 = 9301;
/// Default base; account ports start at `base + 1`.
pub const DEFAULT_BASE_PORT: u16 = 9310;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
	#[error("no free port for account '{name}' in {first}..={last}")]
	Exhausted { name: String, first: u16, last: u16 },
}

/// Port window layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocatorConfig {
	pub base: u16,
	/// Number of account ports above `base`.
	pub span: u16,
	/// Width of the hash fallback window used for accounts outside the roster.
	pub hash_window: u16,
	pub reserved: u16,
}

impl Default for PortAllocatorConfig {
	fn default() -> Self {
		Self {
			base: DEFAULT_BASE_PORT,
			span: 100,
			hash_window: 20,
			reserved: DEFAULT_RESERVED_PORT,
		}
	}
}

impl PortAllocatorConfig {
	fn first(&self) -> u16 {
		self.base.saturating_add(1)
	}

	fn last(&self) -> u16 {
		self.base.saturating_add(self.span.max(1))
	}

	/// Ports actually available in `first()..=last()`, after clamping at `u16::MAX`.
	fn width(&self) -> u32 {
		u32::from(self.last()) - u32::from(self.first()) + 1
	}
}

type PortProbe = Box<dyn Fn(u16) -> bool + Send + Sync>;

#[derive(Default)]
struct Table {
	by_name: HashMap<String, u16>,
	by_port: HashMap<u16, String>,
	positions: HashMap<String, usize>,
}

/// Thread-safe allocation table. One mutex guards all of it.
pub struct PortAllocator {
	config: PortAllocatorConfig,
	table: Mutex<Table>,
	probe: PortProbe,
}

impl PortAllocator {
	/// Creates an allocator that trusts every port in the window.
	pub fn new(config: PortAllocatorConfig) -> Self {
		Self::with_probe(config, |_| true)
	}

	/// Creates an allocator that skips ports for which `probe` returns `false`
	/// (for example ports already bound by an unrelated process).
	pub fn with_probe(config: PortAllocatorConfig, probe: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
		Self {
			config,
			table: Mutex::new(Table::default()),
			probe: Box::new(probe),
		}
	}

	pub fn config(&self) -> PortAllocatorConfig {
		self.config
	}

	/// Port reserved for the pre-flight health-check session. Never handed to an account.
	pub fn reserved(&self) -> u16 {
		self.config.reserved
	}

	/// Records roster positions (1-based, in iteration order) used for deterministic ports.
	pub fn set_roster<I, S>(&self, names: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut table = self.table.lock();
		table.positions = names.into_iter().enumerate().map(|(idx, name)| (name.into(), idx + 1)).collect();
	}

	/// Port the account would get with an empty table.
	pub fn preferred_port(&self, name: &str) -> u16 {
		let table = self.table.lock();
		self.preferred_for(&table, name)
	}

	fn preferred_for(&self, table: &Table, name: &str) -> u16 {
		let width = u64::from(self.config.width());
		let offset = match table.positions.get(name) {
			Some(position) => (*position as u64).saturating_sub(1) % width,
			None => stable_hash(name) % u64::from(self.config.hash_window.max(1)).min(width),
		};
		// offset < width, so this stays within first()..=last().
		(u64::from(self.config.first()) + offset) as u16
	}

	/// Assigns a port to `name`, returning the existing one if already assigned.
	pub fn allocate(&self, name: &str) -> Result<u16, AllocError> {
		let mut table = self.table.lock();
		if let Some(port) = table.by_name.get(name) {
			return Ok(*port);
		}

		let first = self.config.first();
		let last = self.config.last();
		let preferred = self.preferred_for(&table, name);
		let width = self.config.width();

		for step in 0..width {
			let candidate = (u32::from(first) + (u32::from(preferred - first) + step) % width) as u16;
			if candidate == self.config.reserved || table.by_port.contains_key(&candidate) {
				continue;
			}
			if !(self.probe)(candidate) {
				debug!(target: "fanout.ports", port = candidate, "port busy on host; skipping");
				continue;
			}
			table.by_name.insert(name.to_string(), candidate);
			table.by_port.insert(candidate, name.to_string());
			debug!(target: "fanout.ports", account = %name, port = candidate, preferred, "port allocated");
			return Ok(candidate);
		}

		Err(AllocError::Exhausted {
			name: name.to_string(),
			first,
			last,
		})
	}

	/// Frees the port held by `name`. Safe to call for names that never allocated.
	pub fn release(&self, name: &str) -> Option<u16> {
		let mut table = self.table.lock();
		let port = table.by_name.remove(name)?;
		table.by_port.remove(&port);
		debug!(target: "fanout.ports", account = %name, port, "port released");
		Some(port)
	}

	pub fn port_of(&self, name: &str) -> Option<u16> {
		self.table.lock().by_name.get(name).copied()
	}

	/// Live assignments sorted by port.
	pub fn snapshot(&self) -> Vec<(String, u16)> {
		let table = self.table.lock();
		let mut rows: Vec<_> = table.by_name.iter().map(|(name, port)| (name.clone(), *port)).collect();
		rows.sort_by_key(|(_, port)| *port);
		rows
	}

	pub fn is_empty(&self) -> bool {
		self.table.lock().by_name.is_empty()
	}
}

impl Default for PortAllocator {
	fn default() -> Self {
		Self::new(PortAllocatorConfig::default())
	}
}

/// 64-bit FNV-1a. Stable across processes, unlike the std hasher.
pub fn stable_hash(value: &str) -> u64 {
	const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
	const PRIME: u64 = 0x0000_0100_0000_01b3;
	value.bytes().fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::Arc;

	use super::*;

	#[test]
	fn roster_position_drives_port() {
		let alloc = PortAllocator::default();
		alloc.set_roster(["alice", "bob", "carol"]);
		assert_eq!(alloc.allocate("bob").unwrap(), 9312);
		assert_eq!(alloc.allocate("alice").unwrap(), 9311);
		assert_eq!(alloc.allocate("carol").unwrap(), 9313);
	}

	#[test]
	fn allocate_is_idempotent_per_name() {
		let alloc = PortAllocator::default();
		let first = alloc.allocate("alice").unwrap();
		assert_eq!(alloc.allocate("alice").unwrap(), first);
		assert_eq!(alloc.snapshot().len(), 1);
	}

	#[test]
	fn unknown_accounts_hash_into_fallback_window() {
		let alloc = PortAllocator::default();
		let port = alloc.preferred_port("somebody");
		assert!((9311..=9330).contains(&port), "port was {port}");
		assert_eq!(port, alloc.preferred_port("somebody"));
	}

	#[test]
	fn colliding_preference_moves_to_next_free_port() {
		let alloc = PortAllocator::default();
		alloc.set_roster(["alice"]);
		let taken = alloc.allocate("alice").unwrap();
		alloc.set_roster(["bob"]);
		let other = alloc.allocate("bob").unwrap();
		assert_eq!(taken, 9311);
		assert_eq!(other, 9312);
	}

	#[test]
	fn reserved_port_is_never_assigned() {
		let alloc = PortAllocator::new(PortAllocatorConfig {
			base: 9300,
			span: 3,
			hash_window: 3,
			reserved: 9301,
		});
		let ports: HashSet<u16> = ["a", "b"].iter().map(|name| alloc.allocate(name).unwrap()).collect();
		assert!(!ports.contains(&9301));
		assert_eq!(ports.len(), 2);
		assert!(matches!(alloc.allocate("c"), Err(AllocError::Exhausted { .. })));
	}

	#[test]
	fn busy_host_ports_are_skipped() {
		let alloc = PortAllocator::with_probe(PortAllocatorConfig::default(), |port| port != 9311);
		alloc.set_roster(["alice"]);
		assert_eq!(alloc.allocate("alice").unwrap(), 9312);
	}

	#[test]
	fn release_is_idempotent_and_frees_port() {
		let alloc = PortAllocator::default();
		assert_eq!(alloc.release("never"), None);
		let port = alloc.allocate("alice").unwrap();
		assert_eq!(alloc.release("alice"), Some(port));
		assert_eq!(alloc.release("alice"), None);
		assert!(alloc.is_empty());
		assert_eq!(alloc.allocate("bob").map(|p| p > 0), Ok(true));
	}

	#[test]
	fn concurrent_allocations_stay_unique() {
		let alloc = Arc::new(PortAllocator::default());
		let handles: Vec<_> = (0..32)
			.map(|idx| {
				let alloc = Arc::clone(&alloc);
				std::thread::spawn(move || alloc.allocate(&format!("account-{idx}")).unwrap())
			})
			.collect();
		let ports: HashSet<u16> = handles.into_iter().map(|h| h.join().unwrap()).collect();
		assert_eq!(ports.len(), 32);
	}

	#[test]
	fn window_clamped_at_the_top_of_the_port_range() {
		let alloc = PortAllocator::new(PortAllocatorConfig {
			base: 65500,
			span: 100,
			hash_window: 20,
			reserved: 9301,
		});
		let roster: Vec<String> = (1..=60).map(|idx| format!("acct{idx}")).collect();
		alloc.set_roster(roster.iter().cloned());

		let preferred = alloc.preferred_port("acct50");
		assert!((65501..=65535).contains(&preferred), "port was {preferred}");
		let ports: HashSet<u16> = roster[..35].iter().map(|name| alloc.allocate(name).unwrap()).collect();
		assert_eq!(ports.len(), 35);
		assert!(ports.iter().all(|port| *port >= 65501));
		assert!(matches!(alloc.allocate("acct50"), Err(AllocError::Exhausted { last: 65535, .. })));
	}

	#[test]
	fn stable_hash_is_fnv1a() {
		assert_eq!(stable_hash(""), 0xcbf2_9ce4_8422_2325);
		assert_eq!(stable_hash("a"), 0xaf63_dc4c_8601_ec8c);
	}
}
