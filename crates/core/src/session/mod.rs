//! Automation sessions and their lifecycle.

mod handle;
mod launcher;
mod manager;
mod state;
pub mod wait;

pub use handle::{AutomationSession, ElementRef, Locator};
pub use launcher::{LaunchRequest, SessionLauncher, launch_with_fallback};
pub use manager::{PREFLIGHT_ACCOUNT, SessionManager, SessionSettings};
pub use state::SessionState;

use crate::error::Result;

/// A live automation context owned by exactly one worker.
///
/// Created by [`SessionManager::acquire`] and torn down by
/// [`SessionManager::release`].
pub struct Session {
	account: String,
	port: u16,
	tier: String,
	state: SessionState,
	popup_handled: bool,
	credentials_restored: usize,
	handle: Box<dyn AutomationSession>,
}

impl Session {
	fn created(account: &str, port: u16, tier: String, handle: Box<dyn AutomationSession>) -> Result<Self> {
		let mut state = SessionState::Uninitialized;
		state.transition(SessionState::Created)?;
		Ok(Self {
			account: account.to_string(),
			port,
			tier,
			state,
			popup_handled: false,
			credentials_restored: 0,
			handle,
		})
	}

	pub fn account(&self) -> &str {
		&self.account
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// Launcher tier that created this session.
	pub fn tier(&self) -> &str {
		&self.tier
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn is_closed(&self) -> bool {
		self.state == SessionState::Closed
	}

	pub fn handle(&self) -> &dyn AutomationSession {
		self.handle.as_ref()
	}

	/// Whether the site's first-visit popup was already dismissed in this session.
	pub fn popup_handled(&self) -> bool {
		self.popup_handled
	}

	pub fn mark_popup_handled(&mut self) {
		self.popup_handled = true;
	}

	pub fn credentials_restored(&self) -> usize {
		self.credentials_restored
	}

	/// `Ready → Busy` before an interaction.
	pub fn begin_work(&mut self) -> Result<()> {
		self.state.transition(SessionState::Busy)
	}

	/// `Busy → Ready` after an interaction, whatever its outcome.
	pub fn end_work(&mut self) -> Result<()> {
		self.state.transition(SessionState::Ready)
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("account", &self.account)
			.field("port", &self.port)
			.field("tier", &self.tier)
			.field("state", &self.state)
			.field("popup_handled", &self.popup_handled)
			.finish()
	}
}
