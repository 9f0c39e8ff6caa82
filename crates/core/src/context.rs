//! Per-run wiring of the engine's components.
//!
//! A [`RunContext`] is built once per batch run and shared by reference with
//! the scheduler and every worker. Nothing in the engine is a global.

use std::sync::Arc;

use fanout_runtime::PortAllocator;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::flow::PublishFlow;
use crate::ledger::ContentHashStore;
use crate::processor::{DEFAULT_RECOVERY_ATTEMPTS, WorkItemProcessor};
use crate::quota::AccountQuotaTracker;
use crate::scheduler::{NoopObserver, RunObserver};
use crate::session::{SessionLauncher, SessionManager, SessionSettings};
use crate::store::Store;
use crate::validate::{AcceptAll, Validator};

/// Items between forced returns to the flow's entry page.
pub const DEFAULT_RENAVIGATE_EVERY: u32 = 5;

/// Run-level knobs.
#[derive(Debug, Clone)]
pub struct RunSettings {
	/// Successful publications per account per day.
	pub daily_target: u32,
	/// Start one health-check session on the reserved port before dispatching.
	pub preflight: bool,
	pub renavigate_every: u32,
	pub recovery_attempts: u32,
}

impl Default for RunSettings {
	fn default() -> Self {
		Self {
			daily_target: 10,
			preflight: false,
			renavigate_every: DEFAULT_RENAVIGATE_EVERY,
			recovery_attempts: DEFAULT_RECOVERY_ATTEMPTS,
		}
	}
}

/// Everything one run needs.
pub struct RunContext {
	pub store: Arc<dyn Store>,
	pub ledger: Arc<ContentHashStore>,
	pub quota: Arc<AccountQuotaTracker>,
	pub sessions: Arc<SessionManager>,
	pub processor: Arc<WorkItemProcessor>,
	pub observer: Arc<dyn RunObserver>,
	pub settings: RunSettings,
}

impl RunContext {
	pub fn builder(store: Arc<dyn Store>, flow: Arc<dyn PublishFlow>) -> RunContextBuilder {
		RunContextBuilder {
			store,
			flow,
			clock: Arc::new(SystemClock),
			validator: Arc::new(AcceptAll),
			observer: Arc::new(NoopObserver),
			launchers: Vec::new(),
			allocator: None,
			session_settings: SessionSettings::default(),
			settings: RunSettings::default(),
		}
	}
}

/// Builder for [`RunContext`].
pub struct RunContextBuilder {
	store: Arc<dyn Store>,
	flow: Arc<dyn PublishFlow>,
	clock: Arc<dyn Clock>,
	validator: Arc<dyn Validator>,
	observer: Arc<dyn RunObserver>,
	launchers: Vec<Box<dyn SessionLauncher>>,
	allocator: Option<Arc<PortAllocator>>,
	session_settings: SessionSettings,
	settings: RunSettings,
}

impl RunContextBuilder {
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
		self.validator = validator;
		self
	}

	pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
		self.observer = observer;
		self
	}

	/// Appends a launcher tier. Tiers are tried in the order added.
	pub fn with_launcher(mut self, launcher: Box<dyn SessionLauncher>) -> Self {
		self.launchers.push(launcher);
		self
	}

	pub fn with_launchers(mut self, launchers: Vec<Box<dyn SessionLauncher>>) -> Self {
		self.launchers.extend(launchers);
		self
	}

	pub fn with_allocator(mut self, allocator: Arc<PortAllocator>) -> Self {
		self.allocator = Some(allocator);
		self
	}

	pub fn with_session_settings(mut self, settings: SessionSettings) -> Self {
		self.session_settings = settings;
		self
	}

	pub fn with_settings(mut self, settings: RunSettings) -> Self {
		self.settings = settings;
		self
	}

	/// Opens the ledger and wires the components together.
	pub fn build(self) -> Result<RunContext> {
		let ledger = Arc::new(ContentHashStore::open(Arc::clone(&self.store), Arc::clone(&self.clock))?);
		let quota = Arc::new(AccountQuotaTracker::new(Arc::clone(&self.store), Arc::clone(&self.clock)));
		let allocator = self.allocator.unwrap_or_default();
		let sessions = Arc::new(SessionManager::new(self.launchers, allocator, Arc::clone(&self.store), self.session_settings));
		let processor = Arc::new(
			WorkItemProcessor::new(
				Arc::clone(&ledger),
				Arc::clone(&quota),
				Arc::clone(&sessions),
				self.validator,
				self.flow,
				Arc::clone(&self.observer),
			)
			.with_recovery_attempts(self.settings.recovery_attempts),
		);

		Ok(RunContext {
			store: self.store,
			ledger,
			quota,
			sessions,
			processor,
			observer: self.observer,
			settings: self.settings,
		})
	}
}
