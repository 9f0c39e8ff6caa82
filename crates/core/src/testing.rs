//! In-memory fakes for exercising the engine without a browser.
//!
//! [`FakeBrowser`] is a controller: it hands out launcher tiers, records
//! every session they create and lets a test inject failures.
//!
//! ```ignore
//! let browser = FakeBrowser::new();
//! browser.fail_account("bob");
//! let ctx = RunContext::builder(store, Arc::new(FakeFlow::new()))
//!     .with_launchers(browser.tiers(&["bundled", "host", "fetched"]))
//!     .build()?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fanout_protocol::{Cookie, ItemDescription};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{FanoutError, Result};
use crate::flow::{PublishContext, PublishFlow, PublishStep};
use crate::scheduler::RunObserver;
use crate::session::{AutomationSession, ElementRef, LaunchRequest, Locator, SessionLauncher};
use crate::validate::{Validation, Validator};

#[derive(Default)]
struct BrowserState {
	attempts: Mutex<Vec<String>>,
	launches: Mutex<Vec<(String, u16)>>,
	live: Mutex<HashMap<u16, String>>,
	max_live: AtomicUsize,
	port_collisions: AtomicUsize,
	closed: AtomicUsize,
	refreshes: Mutex<HashMap<String, usize>>,
	failing_tiers: Mutex<HashSet<String>>,
	failing_accounts: Mutex<HashSet<String>>,
	sessions: Mutex<Vec<(String, Arc<AtomicBool>)>>,
}

/// Controller for fake launchers and the sessions they create.
#[derive(Clone, Default)]
pub struct FakeBrowser {
	state: Arc<BrowserState>,
}

impl FakeBrowser {
	pub fn new() -> Self {
		Self::default()
	}

	/// A launcher tier backed by this controller.
	pub fn launcher(&self, tier: &str) -> Box<dyn SessionLauncher> {
		Box::new(FakeLauncher {
			tier: tier.to_string(),
			state: Arc::clone(&self.state),
		})
	}

	pub fn tiers(&self, names: &[&str]) -> Vec<Box<dyn SessionLauncher>> {
		names.iter().map(|name| self.launcher(name)).collect()
	}

	/// Every launch of `tier` fails.
	pub fn fail_tier(&self, tier: &str) {
		self.state.failing_tiers.lock().insert(tier.to_string());
	}

	/// Every tier fails for `account`.
	pub fn fail_account(&self, account: &str) {
		self.state.failing_accounts.lock().insert(account.to_string());
	}

	/// Makes every open session of `account` stop answering probes.
	pub fn kill_sessions(&self, account: &str) {
		for (owner, alive) in self.state.sessions.lock().iter() {
			if owner == account {
				alive.store(false, Ordering::SeqCst);
			}
		}
	}

	/// Tier names in the order they were attempted.
	pub fn attempted_tiers(&self) -> Vec<String> {
		self.state.attempts.lock().clone()
	}

	/// Successful launches as `(account, port)`.
	pub fn launches(&self) -> Vec<(String, u16)> {
		self.state.launches.lock().clone()
	}

	pub fn live_sessions(&self) -> usize {
		self.state.live.lock().len()
	}

	/// Highest number of simultaneously open sessions.
	pub fn max_live_sessions(&self) -> usize {
		self.state.max_live.load(Ordering::SeqCst)
	}

	/// Launches that reused a port another open session still held.
	pub fn port_collisions(&self) -> usize {
		self.state.port_collisions.load(Ordering::SeqCst)
	}

	pub fn closed(&self) -> usize {
		self.state.closed.load(Ordering::SeqCst)
	}

	pub fn refreshes(&self, account: &str) -> usize {
		self.state.refreshes.lock().get(account).copied().unwrap_or(0)
	}
}

struct FakeLauncher {
	tier: String,
	state: Arc<BrowserState>,
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
	fn tier(&self) -> &str {
		&self.tier
	}

	async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Box<dyn AutomationSession>> {
		self.state.attempts.lock().push(self.tier.clone());
		if self.state.failing_tiers.lock().contains(&self.tier) || self.state.failing_accounts.lock().contains(request.account) {
			return Err(FanoutError::Context(format!("{} driver unavailable", self.tier)));
		}

		{
			let mut live = self.state.live.lock();
			if live.insert(request.port, request.account.to_string()).is_some() {
				self.state.port_collisions.fetch_add(1, Ordering::SeqCst);
			}
			self.state.max_live.fetch_max(live.len(), Ordering::SeqCst);
		}
		self.state.launches.lock().push((request.account.to_string(), request.port));

		let alive = Arc::new(AtomicBool::new(true));
		self.state.sessions.lock().push((request.account.to_string(), Arc::clone(&alive)));
		Ok(Box::new(FakeSession {
			account: request.account.to_string(),
			port: request.port,
			state: Arc::clone(&self.state),
			alive,
			location: Mutex::new("about:blank".to_string()),
			closed: AtomicBool::new(false),
		}))
	}
}

struct FakeSession {
	account: String,
	port: u16,
	state: Arc<BrowserState>,
	alive: Arc<AtomicBool>,
	location: Mutex<String>,
	closed: AtomicBool,
}

impl FakeSession {
	fn ensure_alive(&self) -> Result<()> {
		if self.alive.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(FanoutError::SessionLost(format!("fake session for {} is gone", self.account)))
		}
	}
}

#[async_trait]
impl AutomationSession for FakeSession {
	async fn navigate(&self, url: &str) -> Result<()> {
		self.ensure_alive()?;
		*self.location.lock() = url.to_string();
		Ok(())
	}

	async fn current_location(&self) -> Result<String> {
		self.ensure_alive()?;
		Ok(self.location.lock().clone())
	}

	async fn refresh(&self) -> Result<()> {
		self.ensure_alive()?;
		*self.state.refreshes.lock().entry(self.account.clone()).or_default() += 1;
		Ok(())
	}

	async fn inject_credentials(&self, cookies: &[Cookie]) -> Result<usize> {
		self.ensure_alive()?;
		Ok(cookies.len())
	}

	async fn execute_script(&self, _code: &str, _args: Vec<Value>) -> Result<Value> {
		self.ensure_alive()?;
		Ok(Value::Null)
	}

	async fn find_elements(&self, _locator: Locator, selector: &str) -> Result<Vec<ElementRef>> {
		self.ensure_alive()?;
		Ok(vec![ElementRef(selector.to_string())])
	}

	async fn click(&self, _element: &ElementRef) -> Result<()> {
		self.ensure_alive()
	}

	async fn send_keys(&self, _element: &ElementRef, _text: &str) -> Result<()> {
		self.ensure_alive()
	}

	async fn probe(&self) -> bool {
		self.alive.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
	}

	async fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.alive.store(false, Ordering::SeqCst);
		self.state.closed.fetch_add(1, Ordering::SeqCst);
		let mut live = self.state.live.lock();
		if live.get(&self.port).is_some_and(|owner| owner == &self.account) {
			live.remove(&self.port);
		}
		Ok(())
	}
}

/// Catalog fake: accepts everything unless told otherwise.
#[derive(Default)]
pub struct FakeValidator {
	rejected: Mutex<HashSet<String>>,
	unavailable: Mutex<HashSet<String>>,
	calls: Mutex<Vec<String>>,
}

impl FakeValidator {
	pub fn new() -> Self {
		Self::default()
	}

	/// The catalog answers "no such item" for `reference`.
	pub fn reject(&self, reference: &str) {
		self.rejected.lock().insert(reference.to_string());
	}

	/// Lookups for `reference` fail at the transport level.
	pub fn make_unavailable(&self, reference: &str) {
		self.unavailable.lock().insert(reference.to_string());
	}

	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}
}

#[async_trait]
impl Validator for FakeValidator {
	async fn validate(&self, reference: &str, _credentials: &[Cookie]) -> Result<Validation> {
		self.calls.lock().push(reference.to_string());
		if self.unavailable.lock().contains(reference) {
			return Err(FanoutError::Validation(format!("catalog timeout for {reference}")));
		}
		if self.rejected.lock().contains(reference) {
			return Ok(Validation::Rejected("item not in catalog".to_string()));
		}
		Ok(Validation::Accepted(ItemDescription {
			external_id: reference.to_string(),
			name: format!("item {reference}"),
			price: Some(9.9),
			commission: Some(1.0),
		}))
	}
}

#[derive(Debug, Clone, Copy)]
enum StepFault {
	/// The step times out `remaining` more times, then succeeds.
	Timeout { step: PublishStep, remaining: u32 },
	/// The session dies during the step.
	Crash { step: PublishStep },
}

/// Interaction script fake that records publications per account.
#[derive(Default)]
pub struct FakeFlow {
	faults: Mutex<HashMap<String, StepFault>>,
	published: Mutex<Vec<(String, String)>>,
	steps: Mutex<Vec<(String, PublishStep, bool)>>,
	recoveries: AtomicUsize,
	step_delay: Option<Duration>,
	kill: Mutex<Option<FakeBrowser>>,
}

impl FakeFlow {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sleeps this long in every step so workers interleave.
	pub fn with_step_delay(mut self, delay: Duration) -> Self {
		self.step_delay = Some(delay);
		self
	}

	/// `step` times out `times` times for items named `file`.
	pub fn time_out(&self, file: &str, step: PublishStep, times: u32) {
		self.faults.lock().insert(file.to_string(), StepFault::Timeout { step, remaining: times });
	}

	/// The session running `file` dies during `step`.
	pub fn crash_on(&self, file: &str, step: PublishStep, browser: &FakeBrowser) {
		self.faults.lock().insert(file.to_string(), StepFault::Crash { step });
		*self.kill.lock() = Some(browser.clone());
	}

	/// `(account, file)` pairs that reached the publish step.
	pub fn published(&self) -> Vec<(String, String)> {
		self.published.lock().clone()
	}

	pub fn published_by(&self, account: &str) -> usize {
		self.published.lock().iter().filter(|(owner, _)| owner == account).count()
	}

	/// `(file, step, first_popup_pending)` for every step run.
	pub fn steps(&self) -> Vec<(String, PublishStep, bool)> {
		self.steps.lock().clone()
	}

	pub fn recoveries(&self) -> usize {
		self.recoveries.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PublishFlow for FakeFlow {
	fn entry_url(&self) -> Option<&str> {
		Some("https://example.test/upload")
	}

	async fn run_step(&self, step: PublishStep, session: &dyn AutomationSession, ctx: &PublishContext<'_>) -> Result<()> {
		if let Some(delay) = self.step_delay {
			tokio::time::sleep(delay).await;
		}
		let file = ctx.item.file_name();
		self.steps.lock().push((file.clone(), step, ctx.first_popup_pending));

		let fault = {
			let mut faults = self.faults.lock();
			match faults.get_mut(&file) {
				Some(StepFault::Timeout { step: at, remaining }) if *at == step && *remaining > 0 => {
					*remaining -= 1;
					Some(FanoutError::ElementTimeout {
						what: format!("{step} control"),
						timeout_secs: 30,
					})
				}
				Some(StepFault::Crash { step: at }) if *at == step => {
					faults.remove(&file);
					let browser = self.kill.lock().clone();
					if let Some(browser) = browser {
						browser.kill_sessions(ctx.account);
					}
					Some(FanoutError::SessionLost("renderer crashed".to_string()))
				}
				_ => None,
			}
		};
		if let Some(err) = fault {
			return Err(err);
		}

		session.find_element(Locator::Css, step.name()).await?;
		if step == PublishStep::Publish {
			self.published.lock().push((ctx.account.to_string(), file));
		}
		Ok(())
	}

	async fn recover(&self, session: &dyn AutomationSession) -> Result<()> {
		self.recoveries.fetch_add(1, Ordering::SeqCst);
		session.refresh().await
	}
}

/// Observer event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
	Progress(usize, usize),
	Status(String, String),
	Liveness(String, bool),
}

/// Observer that keeps every event and the peak number of active accounts.
#[derive(Default)]
pub struct RecordingObserver {
	events: Mutex<Vec<ObservedEvent>>,
	active: Mutex<HashSet<String>>,
	peak_active: AtomicUsize,
}

impl RecordingObserver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<ObservedEvent> {
		self.events.lock().clone()
	}

	pub fn peak_active(&self) -> usize {
		self.peak_active.load(Ordering::SeqCst)
	}

	pub fn statuses(&self, account: &str) -> Vec<String> {
		self.events
			.lock()
			.iter()
			.filter_map(|event| match event {
				ObservedEvent::Status(who, message) if who == account => Some(message.clone()),
				_ => None,
			})
			.collect()
	}
}

impl RunObserver for RecordingObserver {
	fn on_progress(&self, processed: usize, total: usize) {
		self.events.lock().push(ObservedEvent::Progress(processed, total));
	}

	fn on_status(&self, account: &str, message: &str) {
		self.events.lock().push(ObservedEvent::Status(account.to_string(), message.to_string()));
	}

	fn on_liveness(&self, account: &str, active: bool) {
		self.events.lock().push(ObservedEvent::Liveness(account.to_string(), active));
		let mut set = self.active.lock();
		if active {
			set.insert(account.to_string());
		} else {
			set.remove(account);
		}
		self.peak_active.fetch_max(set.len(), Ordering::SeqCst);
	}
}
