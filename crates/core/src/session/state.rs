//! Session lifecycle states.

use std::fmt;

use crate::error::{FanoutError, Result};

/// `Uninitialized → Created → Ready → (Busy ⇄ Ready)* → Closed`.
///
/// Any live state may move straight to `Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Uninitialized,
	Created,
	Ready,
	Busy,
	Closed,
}

impl SessionState {
	pub fn name(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Created => "created",
			Self::Ready => "ready",
			Self::Busy => "busy",
			Self::Closed => "closed",
		}
	}

	pub fn can_transition(self, to: SessionState) -> bool {
		use SessionState::*;
		matches!(
			(self, to),
			(Uninitialized, Created) | (Created, Ready) | (Ready, Busy) | (Busy, Ready) | (Uninitialized | Created | Ready | Busy, Closed)
		)
	}

	/// Moves to `to` or fails without changing state.
	pub fn transition(&mut self, to: SessionState) -> Result<()> {
		if !self.can_transition(to) {
			return Err(FanoutError::InvalidTransition {
				from: self.name(),
				to: to.name(),
			});
		}
		*self = to;
		Ok(())
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	use super::SessionState::*;
	use super::*;

	#[test]
	fn happy_path_cycles_busy_and_ready() {
		let mut state = Uninitialized;
		for next in [Created, Ready, Busy, Ready, Busy, Ready, Closed] {
			state.transition(next).unwrap();
		}
		assert_eq!(state, Closed);
	}

	#[test]
	fn closed_is_terminal() {
		let mut state = Closed;
		for next in [Uninitialized, Created, Ready, Busy, Closed] {
			assert!(state.transition(next).is_err());
		}
		assert_eq!(state, Closed);
	}

	#[test]
	fn skipping_states_is_rejected() {
		let mut state = Created;
		let err = state.transition(Busy).unwrap_err();
		assert_eq!(err.to_string(), "Invalid session transition created -> busy");
		assert_eq!(state, Created);
		assert!(!Uninitialized.can_transition(Ready));
		assert!(Created.can_transition(Closed));
	}
}
