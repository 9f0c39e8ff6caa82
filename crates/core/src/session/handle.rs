//! Automation session provider interface.

use async_trait::async_trait;
use fanout_protocol::Cookie;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FanoutError, Result};

/// Element lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
	#[default]
	Css,
	Xpath,
	LinkText,
	TagName,
}

impl Locator {
	/// W3C WebDriver `using` value.
	pub fn as_webdriver(self) -> &'static str {
		match self {
			Self::Css => "css selector",
			Self::Xpath => "xpath",
			Self::LinkText => "link text",
			Self::TagName => "tag name",
		}
	}
}

/// Opaque element handle returned by a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

/// One live automation context, bound to a single account.
#[async_trait]
pub trait AutomationSession: Send + Sync {
	async fn navigate(&self, url: &str) -> Result<()>;

	async fn current_location(&self) -> Result<String>;

	async fn refresh(&self) -> Result<()>;

	/// Adds cookies to the current browsing context and returns how many were applied.
	async fn inject_credentials(&self, cookies: &[Cookie]) -> Result<usize>;

	async fn execute_script(&self, code: &str, args: Vec<Value>) -> Result<Value>;

	async fn find_elements(&self, locator: Locator, selector: &str) -> Result<Vec<ElementRef>>;

	async fn find_element(&self, locator: Locator, selector: &str) -> Result<ElementRef> {
		self.find_elements(locator, selector)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| FanoutError::ElementNotFound(selector.to_string()))
	}

	async fn click(&self, element: &ElementRef) -> Result<()>;

	async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;

	/// Cheap liveness check. Must not fail; report `false` instead.
	async fn probe(&self) -> bool;

	async fn close(&self) -> Result<()>;
}
