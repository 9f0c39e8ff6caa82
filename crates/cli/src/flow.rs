//! Data-driven publish flow loaded from a JSON file.
//!
//! ```json
//! {
//!   "entryUrl": "https://creator.example.com/upload",
//!   "popup": [{ "action": "click", "selector": ".guide-close", "optional": true }],
//!   "steps": {
//!     "upload": [{ "action": "upload", "selector": "input[type=file]" }],
//!     "metadata": [{ "action": "fill", "selector": "input.title", "text": "{title}" }],
//!     "attach_reference": [{ "action": "fill", "selector": "input.goods", "text": "{reference}" }],
//!     "publish": [{ "action": "click", "selector": "button.submit" }]
//!   }
//! }
//! ```
//!
//! Text fields accept `{title}`, `{reference}`, `{item_name}`, `{file}` and `{account}`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use fanout::flow::{PublishContext, PublishFlow, PublishStep};
use fanout::session::wait::wait_for_element;
use fanout::session::{AutomationSession, Locator};
use fanout::{FanoutError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

/// One page interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
	Navigate {
		url: String,
	},
	/// Sends the item's absolute path to a file input.
	Upload {
		selector: String,
		#[serde(default)]
		locator: Locator,
		#[serde(default)]
		optional: bool,
	},
	Fill {
		selector: String,
		text: String,
		#[serde(default)]
		locator: Locator,
		#[serde(default)]
		optional: bool,
	},
	Click {
		selector: String,
		#[serde(default)]
		locator: Locator,
		#[serde(default)]
		optional: bool,
	},
	/// Waits until `selector` matches something.
	Wait {
		selector: String,
		#[serde(default)]
		locator: Locator,
		#[serde(default)]
		timeout_secs: Option<u64>,
		#[serde(default)]
		optional: bool,
	},
	Script {
		code: String,
		#[serde(default)]
		args: Vec<String>,
	},
	Sleep {
		millis: u64,
	},
}

impl Action {
	fn optional(&self) -> bool {
		match self {
			Self::Upload { optional, .. } | Self::Fill { optional, .. } | Self::Click { optional, .. } | Self::Wait { optional, .. } => *optional,
			_ => false,
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			Self::Navigate { .. } => "navigate",
			Self::Upload { .. } => "upload",
			Self::Fill { .. } => "fill",
			Self::Click { .. } => "click",
			Self::Wait { .. } => "wait",
			Self::Script { .. } => "script",
			Self::Sleep { .. } => "sleep",
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowDefinition {
	pub entry_url: Option<String>,
	/// Run once per session before the first upload.
	pub popup: Vec<Action>,
	pub steps: HashMap<PublishStep, Vec<Action>>,
}

/// [`PublishFlow`] that replays a [`FlowDefinition`].
pub struct ScriptedFlow {
	definition: FlowDefinition,
	wait_timeout: Duration,
}

impl ScriptedFlow {
	pub fn new(definition: FlowDefinition, wait_timeout: Duration) -> Self {
		Self { definition, wait_timeout }
	}

	pub fn from_file(path: &Path, wait_timeout: Duration) -> anyhow::Result<Self> {
		let raw = fs::read_to_string(path).with_context(|| format!("Failed to read flow file {}", path.display()))?;
		let definition: FlowDefinition = serde_json::from_str(&raw).with_context(|| format!("Invalid flow file {}", path.display()))?;
		Ok(Self::new(definition, wait_timeout))
	}

	pub fn definition(&self) -> &FlowDefinition {
		&self.definition
	}

	async fn run_action(&self, action: &Action, session: &dyn AutomationSession, ctx: &PublishContext<'_>) -> Result<()> {
		trace!(target: "fanout.flow", action = action.kind(), account = %ctx.account, "running action");
		match action {
			Action::Navigate { url } => session.navigate(&render(url, ctx)).await,
			Action::Upload { selector, locator, .. } => {
				let element = wait_for_element(session, *locator, selector, self.wait_timeout).await?;
				let path = ctx.item.path.canonicalize().unwrap_or_else(|_| ctx.item.path.clone());
				session.send_keys(&element, &path.to_string_lossy()).await
			}
			Action::Fill { selector, text, locator, .. } => {
				let element = wait_for_element(session, *locator, selector, self.wait_timeout).await?;
				session.send_keys(&element, &render(text, ctx)).await
			}
			Action::Click { selector, locator, .. } => {
				let element = wait_for_element(session, *locator, selector, self.wait_timeout).await?;
				session.click(&element).await
			}
			Action::Wait {
				selector,
				locator,
				timeout_secs,
				..
			} => {
				let timeout = timeout_secs.map(Duration::from_secs).unwrap_or(self.wait_timeout);
				wait_for_element(session, *locator, selector, timeout).await.map(|_| ())
			}
			Action::Script { code, args } => {
				let args = args.iter().map(|arg| Value::String(render(arg, ctx))).collect();
				session.execute_script(code, args).await.map(|_| ())
			}
			Action::Sleep { millis } => {
				tokio::time::sleep(Duration::from_millis(*millis)).await;
				Ok(())
			}
		}
	}

	async fn run_actions(&self, actions: &[Action], session: &dyn AutomationSession, ctx: &PublishContext<'_>) -> Result<()> {
		for action in actions {
			match self.run_action(action, session, ctx).await {
				Ok(()) => {}
				Err(FanoutError::ElementNotFound(_) | FanoutError::ElementTimeout { .. }) if action.optional() => {
					debug!(target: "fanout.flow", action = action.kind(), "optional action skipped");
				}
				Err(err) => return Err(err),
			}
		}
		Ok(())
	}
}

/// Replaces template placeholders with item data.
pub fn render(template: &str, ctx: &PublishContext<'_>) -> String {
	template
		.replace("{title}", &ctx.title)
		.replace("{reference}", ctx.reference)
		.replace("{item_name}", &ctx.description.name)
		.replace("{file}", &ctx.item.file_name())
		.replace("{account}", ctx.account)
}

#[async_trait]
impl PublishFlow for ScriptedFlow {
	fn entry_url(&self) -> Option<&str> {
		self.definition.entry_url.as_deref()
	}

	async fn run_step(&self, step: PublishStep, session: &dyn AutomationSession, ctx: &PublishContext<'_>) -> Result<()> {
		if step == PublishStep::Upload && ctx.first_popup_pending && !self.definition.popup.is_empty() {
			self.run_actions(&self.definition.popup, session, ctx).await?;
		}
		let Some(actions) = self.definition.steps.get(&step) else {
			debug!(target: "fanout.flow", %step, "no actions configured");
			return Ok(());
		};
		self.run_actions(actions, session, ctx).await
	}
}

#[cfg(test)]
mod tests {
	use fanout::WorkItem;
	use fanout::session::LaunchRequest;
	use fanout::testing::FakeBrowser;
	use fanout_protocol::ItemDescription;

	use super::*;

	const FLOW: &str = r#"{
		"entryUrl": "https://creator.example.test/upload",
		"popup": [{ "action": "click", "selector": ".guide-close", "optional": true }],
		"steps": {
			"upload": [{ "action": "upload", "selector": "input[type=file]" }],
			"metadata": [{ "action": "fill", "selector": "input.title", "text": "{title} #{reference}" }],
			"publish": [{ "action": "click", "locator": "xpath", "selector": "//button[text()='Submit']" }]
		}
	}"#;

	fn item() -> WorkItem {
		WorkItem {
			path: "/content/1001----Summer trip.mp4".into(),
			digest: "sha256:00".to_string(),
			size: 1,
			reference: Some("1001".to_string()),
		}
	}

	#[test]
	fn parses_definition() {
		let definition: FlowDefinition = serde_json::from_str(FLOW).unwrap();
		assert_eq!(definition.entry_url.as_deref(), Some("https://creator.example.test/upload"));
		assert_eq!(definition.popup.len(), 1);
		assert!(definition.popup[0].optional());
		assert_eq!(definition.steps[&PublishStep::Publish][0], Action::Click {
			selector: "//button[text()='Submit']".to_string(),
			locator: Locator::Xpath,
			optional: false,
		});
		assert!(!definition.steps.contains_key(&PublishStep::AttachReference));
	}

	#[test]
	fn render_fills_placeholders() {
		let item = item();
		let description = ItemDescription {
			name: "Kettle".to_string(),
			..Default::default()
		};
		let ctx = PublishContext {
			item: &item,
			account: "alice",
			reference: "1001",
			title: item.title(),
			description: &description,
			first_popup_pending: false,
		};
		assert_eq!(render("{title} #{reference} ({item_name}) by {account}", &ctx), "Summer trip #1001 (Kettle) by alice");
		assert_eq!(render("{file}", &ctx), "1001----Summer trip.mp4");
	}

	#[tokio::test]
	async fn runs_every_step_against_a_session() {
		let browser = FakeBrowser::new();
		let session = browser
			.launcher("bundled")
			.launch(&LaunchRequest {
				account: "alice",
				port: 9311,
				headless: true,
				profile_dir: None,
			})
			.await
			.unwrap();

		let flow = ScriptedFlow::new(serde_json::from_str(FLOW).unwrap(), Duration::from_secs(1));
		let item = item();
		let description = ItemDescription::default();
		let ctx = PublishContext {
			item: &item,
			account: "alice",
			reference: "1001",
			title: item.title(),
			description: &description,
			first_popup_pending: true,
		};
		for step in PublishStep::ALL {
			flow.run_step(step, session.as_ref(), &ctx).await.unwrap();
		}
		assert_eq!(flow.entry_url(), Some("https://creator.example.test/upload"));
	}
}
