//! Site interaction script interface.

use std::fmt;

use async_trait::async_trait;
use fanout_protocol::ItemDescription;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::WorkItem;
use crate::session::AutomationSession;

/// Stages of publishing one item, run in [`PublishStep::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
	Upload,
	Metadata,
	AttachReference,
	Publish,
}

impl PublishStep {
	pub const ALL: [PublishStep; 4] = [Self::Upload, Self::Metadata, Self::AttachReference, Self::Publish];

	pub fn name(self) -> &'static str {
		match self {
			Self::Upload => "upload",
			Self::Metadata => "metadata",
			Self::AttachReference => "attach_reference",
			Self::Publish => "publish",
		}
	}

	/// Steps after which a retry could submit the item twice.
	pub fn is_commit(self) -> bool {
		self == Self::Publish
	}
}

impl fmt::Display for PublishStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Per-item data handed to each step.
#[derive(Debug, Clone)]
pub struct PublishContext<'a> {
	pub item: &'a WorkItem,
	pub account: &'a str,
	pub reference: &'a str,
	pub title: String,
	pub description: &'a ItemDescription,
	/// `true` until the session's first-visit popup has been dismissed.
	pub first_popup_pending: bool,
}

/// Drives one external site's publishing pages.
#[async_trait]
pub trait PublishFlow: Send + Sync {
	/// Page the session returns to between items and after recovery.
	fn entry_url(&self) -> Option<&str> {
		None
	}

	async fn run_step(&self, step: PublishStep, session: &dyn AutomationSession, ctx: &PublishContext<'_>) -> Result<()>;

	/// Brings the page back to a clean starting point after a transient failure.
	async fn recover(&self, session: &dyn AutomationSession) -> Result<()> {
		match self.entry_url() {
			Some(url) => session.navigate(url).await,
			None => session.refresh().await,
		}
	}
}
