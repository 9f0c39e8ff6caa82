//! Session acquisition, health checks and guaranteed teardown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use fanout_protocol::Account;
use fanout_runtime::PortAllocator;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::launcher::{LaunchRequest, SessionLauncher, launch_with_fallback};
use super::state::SessionState;
use super::Session;
use crate::error::{FanoutError, Result};
use crate::store::Store;

/// Pseudo-account name used for the reserved health-check session.
pub const PREFLIGHT_ACCOUNT: &str = "__preflight__";

/// Where sessions land after creation and whether they run headless.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
	/// Page opened before credentials are restored (cookies need a matching origin).
	pub home_url: Option<String>,
	/// Page sessions return to before each interaction.
	pub entry_url: Option<String>,
	pub headless: bool,
	/// Parent directory for per-account browser profiles.
	pub profile_root: Option<PathBuf>,
}

/// Creates, reuses and tears down account sessions.
pub struct SessionManager {
	launchers: Vec<Box<dyn SessionLauncher>>,
	allocator: Arc<PortAllocator>,
	store: Arc<dyn Store>,
	settings: SessionSettings,
	parked: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
	pub fn new(launchers: Vec<Box<dyn SessionLauncher>>, allocator: Arc<PortAllocator>, store: Arc<dyn Store>, settings: SessionSettings) -> Self {
		Self {
			launchers,
			allocator,
			store,
			settings,
			parked: Mutex::new(HashMap::new()),
		}
	}

	pub fn allocator(&self) -> &Arc<PortAllocator> {
		&self.allocator
	}

	pub fn settings(&self) -> &SessionSettings {
		&self.settings
	}

	/// Launcher tier names in fallback order.
	pub fn tiers(&self) -> Vec<String> {
		self.launchers.iter().map(|l| l.tier().to_string()).collect()
	}

	/// Returns a Ready session for `account`.
	///
	/// A parked session is reused when it still answers the liveness probe;
	/// otherwise it is torn down and a new one is launched. On failure nothing
	/// stays registered for the account.
	///
	/// Scheduler workers release on every exit path and never park, so within a
	/// run each acquire launches. Reuse applies to callers that hold sessions
	/// across runs through [`park`](Self::park).
	pub async fn acquire(&self, account: &Account) -> Result<Session> {
		let parked = self.parked.lock().remove(&account.name);
		if let Some(mut session) = parked {
			if self.is_session_live(&session).await {
				info!(target: "fanout.session", account = %account.name, port = session.port(), "reusing live session");
				return Ok(session);
			}
			debug!(target: "fanout.session", account = %account.name, "parked session is stale; discarding");
			self.release(&mut session).await;
		}

		let port = self.allocator.allocate(&account.name)?;
		let request = LaunchRequest {
			account: &account.name,
			port,
			headless: self.settings.headless,
			profile_dir: self.settings.profile_root.as_ref().map(|root| root.join(&account.name)),
		};

		let (tier, handle) = match launch_with_fallback(&self.launchers, &request).await {
			Ok(launched) => launched,
			Err(failures) => {
				self.allocator.release(&account.name);
				return Err(FanoutError::ResourceAcquisition {
					account: account.name.clone(),
					failures,
				});
			}
		};

		let mut session = match Session::created(&account.name, port, tier, handle) {
			Ok(session) => session,
			Err(err) => {
				self.allocator.release(&account.name);
				return Err(err);
			}
		};

		if let Err(err) = self.prepare(&mut session, account).await {
			warn!(target: "fanout.session", account = %account.name, error = %err, "session setup failed");
			self.release(&mut session).await;
			return Err(err);
		}

		if let Err(err) = self.store.set_assigned_port(&account.name, Some(port)) {
			warn!(target: "fanout.session", account = %account.name, error = %err, "failed to persist assigned port");
		}

		info!(
			target: "fanout.session",
			account = %account.name,
			port,
			tier = session.tier(),
			credentials = session.credentials_restored(),
			"session ready"
		);
		Ok(session)
	}

	async fn prepare(&self, session: &mut Session, account: &Account) -> Result<()> {
		if let Some(home) = &self.settings.home_url {
			session.handle().navigate(home).await?;
		}

		if !account.credentials.is_empty() {
			let applied = session.handle().inject_credentials(&account.credentials).await?;
			session.handle().refresh().await?;
			session.credentials_restored = applied;
			if applied == 0 {
				warn!(target: "fanout.session", account = %account.name, "stored credentials had no effect");
			}
		}

		if let Some(entry) = &self.settings.entry_url {
			session.handle().navigate(entry).await?;
		}

		session.state.transition(SessionState::Ready)
	}

	/// The single liveness check used everywhere. Closed sessions are never live.
	pub async fn is_session_live(&self, session: &Session) -> bool {
		!session.is_closed() && session.handle().probe().await
	}

	/// Keeps a Ready session open for the next [`acquire`](Self::acquire) of the same account.
	///
	/// Parked sessions keep their port until reused or closed by
	/// [`release_account`](Self::release_account) or [`shutdown`](Self::shutdown).
	pub async fn park(&self, mut session: Session) {
		if session.state() != SessionState::Ready {
			debug!(target: "fanout.session", account = %session.account, state = %session.state(), "only ready sessions can be parked");
			self.release(&mut session).await;
			return;
		}
		let previous = self.parked.lock().insert(session.account.clone(), session);
		if let Some(mut previous) = previous {
			self.release(&mut previous).await;
		}
	}

	/// Closes the handle and frees everything the session held.
	///
	/// Safe to call any number of times; only the first call does work.
	pub async fn release(&self, session: &mut Session) {
		if session.is_closed() {
			return;
		}

		if let Err(err) = session.handle().close().await {
			warn!(target: "fanout.session", account = %session.account, error = %err, "session close failed");
		}
		session.state = SessionState::Closed;
		self.free_account(&session.account);
		debug!(target: "fanout.session", account = %session.account, port = session.port, "session released");
	}

	/// Frees an account whose session object is unreachable (for example after a worker panic).
	pub async fn release_account(&self, name: &str) {
		let parked = self.parked.lock().remove(name);
		match parked {
			Some(mut session) => self.release(&mut session).await,
			None => self.free_account(name),
		}
	}

	fn free_account(&self, name: &str) {
		self.allocator.release(name);
		if let Err(err) = self.store.set_assigned_port(name, None) {
			debug!(target: "fanout.session", account = %name, error = %err, "could not clear assigned port");
		}
	}

	/// Starts and closes one session on the reserved port to prove the tooling works.
	///
	/// Returns the tier that succeeded.
	pub async fn preflight(&self) -> Result<String> {
		let request = LaunchRequest {
			account: PREFLIGHT_ACCOUNT,
			port: self.allocator.reserved(),
			headless: true,
			profile_dir: None,
		};
		let (tier, handle) = launch_with_fallback(&self.launchers, &request)
			.await
			.map_err(|failures| FanoutError::ResourceAcquisition {
				account: PREFLIGHT_ACCOUNT.to_string(),
				failures,
			})?;

		let live = handle.probe().await;
		if let Err(err) = handle.close().await {
			warn!(target: "fanout.session", error = %err, "preflight session close failed");
		}
		if !live {
			return Err(FanoutError::SessionLost(format!("preflight session from tier '{tier}' did not respond")));
		}
		info!(target: "fanout.session", %tier, port = request.port, "preflight passed");
		Ok(tier)
	}

	pub fn parked_count(&self) -> usize {
		self.parked.lock().len()
	}

	/// Releases every parked session.
	pub async fn shutdown(&self) {
		let sessions: Vec<Session> = self.parked.lock().drain().map(|(_, session)| session).collect();
		for mut session in sessions {
			self.release(&mut session).await;
		}
	}
}
