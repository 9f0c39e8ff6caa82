//! Minimal W3C WebDriver client over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use fanout::session::{AutomationSession, ElementRef, Locator};
use fanout::{FanoutError, Result};
use fanout_protocol::{Cookie, SameSite};
use parking_lot::Mutex;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::process::Child;
use tracing::{debug, trace, warn};

use super::WebDriverError;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

type DriverResult<T> = std::result::Result<T, WebDriverError>;

/// Unwraps the `value` member of a driver response, surfacing W3C errors.
pub(super) async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
	let mut request = client.request(method.clone(), url);
	if let Some(body) = body {
		request = request.json(&body);
	}
	let response = request.send().await?;
	let status = response.status();
	let payload: Value = response.json().await?;
	trace!(target: "fanout.webdriver", %method, %url, %status, "driver response");

	let value = payload.get("value").cloned().unwrap_or(Value::Null);
	if let Some(error) = value.get("error").and_then(Value::as_str) {
		return Err(WebDriverError::Command {
			error: error.to_string(),
			message: value.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
		});
	}
	if !status.is_success() {
		return Err(WebDriverError::Protocol(format!("HTTP {status} from {url}")));
	}
	Ok(value)
}

/// One browser session driven through its own driver process.
pub struct WebDriverSession {
	client: Client,
	endpoint: String,
	session_id: String,
	/// Driver process; killed when the session closes or is dropped.
	driver: Mutex<Option<Child>>,
}

impl WebDriverSession {
	pub(super) fn new(client: Client, endpoint: String, session_id: String, driver: Option<Child>) -> Self {
		Self {
			client,
			endpoint,
			session_id,
			driver: Mutex::new(driver),
		}
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	fn url(&self, path: &str) -> String {
		format!("{}/session/{}{}", self.endpoint, self.session_id, path)
	}

	async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
		Ok(send(&self.client, method, &self.url(path), body).await?)
	}
}

fn cookie_json(cookie: &Cookie) -> Value {
	let mut value = json!({
		"name": cookie.name,
		"value": cookie.value,
		"path": cookie.path.as_deref().unwrap_or("/"),
		"secure": cookie.secure,
		"httpOnly": cookie.http_only,
	});
	if let Some(domain) = &cookie.domain {
		value["domain"] = json!(domain);
	}
	if let Some(expiry) = cookie.persistent_expiry() {
		value["expiry"] = json!(expiry as u64);
	}
	if let Some(same_site) = cookie.same_site {
		value["sameSite"] = json!(match same_site {
			SameSite::Strict => "Strict",
			SameSite::Lax => "Lax",
			SameSite::None => "None",
		});
	}
	value
}

#[async_trait]
impl AutomationSession for WebDriverSession {
	async fn navigate(&self, url: &str) -> Result<()> {
		self.command(Method::POST, "/url", Some(json!({ "url": url })))
			.await
			.map_err(|err| match err {
				FanoutError::SessionLost(_) => err,
				other => FanoutError::Navigation {
					url: url.to_string(),
					source: anyhow::Error::new(other),
				},
			})?;
		Ok(())
	}

	async fn current_location(&self) -> Result<String> {
		let value = self.command(Method::GET, "/url", None).await?;
		value
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| WebDriverError::Protocol(format!("url is not a string: {value}")).into())
	}

	async fn refresh(&self) -> Result<()> {
		self.command(Method::POST, "/refresh", Some(json!({}))).await?;
		Ok(())
	}

	async fn inject_credentials(&self, cookies: &[Cookie]) -> Result<usize> {
		let mut applied = 0;
		for cookie in cookies {
			match self.command(Method::POST, "/cookie", Some(json!({ "cookie": cookie_json(cookie) }))).await {
				Ok(_) => applied += 1,
				Err(err @ FanoutError::SessionLost(_)) => return Err(err),
				Err(err) => warn!(target: "fanout.webdriver", cookie = %cookie.name, error = %err, "cookie rejected by browser"),
			}
		}
		Ok(applied)
	}

	async fn execute_script(&self, code: &str, args: Vec<Value>) -> Result<Value> {
		self.command(Method::POST, "/execute/sync", Some(json!({ "script": code, "args": args })))
			.await
	}

	async fn find_elements(&self, locator: Locator, selector: &str) -> Result<Vec<ElementRef>> {
		let value = self
			.command(Method::POST, "/elements", Some(json!({ "using": locator.as_webdriver(), "value": selector })))
			.await?;
		let Some(list) = value.as_array() else {
			return Err(WebDriverError::Protocol(format!("elements is not a list: {value}")).into());
		};
		Ok(list
			.iter()
			.filter_map(|entry| entry.get(ELEMENT_KEY).and_then(Value::as_str))
			.map(|id| ElementRef(id.to_string()))
			.collect())
	}

	async fn click(&self, element: &ElementRef) -> Result<()> {
		self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
			.await?;
		Ok(())
	}

	async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
		self.command(Method::POST, &format!("/element/{}/value", element.0), Some(json!({ "text": text })))
			.await?;
		Ok(())
	}

	async fn probe(&self) -> bool {
		let exited = {
			let mut driver = self.driver.lock();
			driver.as_mut().is_some_and(|child| matches!(child.try_wait(), Ok(Some(_))))
		};
		if exited {
			return false;
		}
		let request = self.client.get(self.url("/url")).timeout(Duration::from_secs(5));
		match request.send().await {
			Ok(response) => response.status().is_success(),
			Err(_) => false,
		}
	}

	async fn close(&self) -> Result<()> {
		let result = send(&self.client, Method::DELETE, &self.url(""), None).await;
		if let Err(err) = &result {
			debug!(target: "fanout.webdriver", session = %self.session_id, error = %err, "session delete failed");
		}
		let child = self.driver.lock().take();
		if let Some(mut child) = child {
			if let Err(err) = child.kill().await {
				debug!(target: "fanout.webdriver", error = %err, "driver already gone");
			}
		}
		Ok(())
	}
}
