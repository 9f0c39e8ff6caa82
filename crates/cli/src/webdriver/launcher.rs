//! Driver process launch for each fallback tier.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fanout::session::{AutomationSession, LaunchRequest, SessionLauncher};
use fanout::{FanoutError, Result};
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::client::{WebDriverSession, send};
use super::driver::{DriverTier, fetch_driver, locate_driver};
use crate::config::SessionConfig;

const READY_ATTEMPTS: u32 = 25;
const READY_INTERVAL: Duration = Duration::from_millis(200);

/// Launches sessions with the driver found by one [`DriverTier`].
pub struct DriverLauncher {
	tier: DriverTier,
	config: Arc<SessionConfig>,
	client: Client,
}

impl DriverLauncher {
	pub fn new(tier: DriverTier, config: Arc<SessionConfig>) -> Result<Self> {
		let client = Client::builder()
			.timeout(config.wait_timeout())
			.build()
			.map_err(|e| FanoutError::Context(format!("Failed to create HTTP client: {e}")))?;
		Ok(Self { tier, config, client })
	}

	async fn resolve_driver(&self) -> anyhow::Result<std::path::PathBuf> {
		match self.tier {
			DriverTier::Fetched => fetch_driver(&self.config).await,
			tier => locate_driver(tier, &self.config),
		}
	}

	fn capabilities(&self, request: &LaunchRequest<'_>) -> Value {
		let mut args = vec![
			"--no-first-run".to_string(),
			"--no-default-browser-check".to_string(),
			"--disable-blink-features=AutomationControlled".to_string(),
			"--disable-dev-shm-usage".to_string(),
		];
		if request.headless {
			args.push("--headless=new".to_string());
			args.push("--window-size=1920,1080".to_string());
		}
		if let Some(dir) = &request.profile_dir {
			args.push(format!("--user-data-dir={}", dir.display()));
		}

		let mut options = json!({ "args": args });
		if let Some(binary) = &self.config.browser_binary {
			options["binary"] = json!(binary.display().to_string());
		}
		json!({
			"capabilities": {
				"alwaysMatch": {
					"browserName": "chrome",
					"goog:chromeOptions": options,
				}
			}
		})
	}
}

/// All three tiers in fallback order.
pub fn driver_launchers(config: Arc<SessionConfig>) -> Result<Vec<Box<dyn SessionLauncher>>> {
	DriverTier::ALL
		.into_iter()
		.map(|tier| DriverLauncher::new(tier, Arc::clone(&config)).map(|l| Box::new(l) as Box<dyn SessionLauncher>))
		.collect()
}

fn spawn_driver(path: &Path, port: u16) -> Result<Child> {
	let mut cmd = Command::new(path);
	cmd.arg(format!("--port={port}"))
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.kill_on_drop(true);
	cmd.spawn()
		.map_err(|e| FanoutError::Context(format!("Failed to start driver at {}: {e}", path.display())))
}

/// Polls `/status` until the driver reports ready or exits.
async fn wait_ready(client: &Client, endpoint: &str, child: &mut Child) -> Result<()> {
	let mut last_error = "endpoint not reachable".to_string();
	for _ in 0..READY_ATTEMPTS {
		tokio::time::sleep(READY_INTERVAL).await;

		if let Ok(Some(status)) = child.try_wait() {
			return Err(FanoutError::Context(format!("driver exited before becoming ready (status: {status})")));
		}

		match send(client, Method::GET, &format!("{endpoint}/status"), None).await {
			Ok(value) if value.get("ready").and_then(Value::as_bool).unwrap_or(true) => return Ok(()),
			Ok(value) => last_error = format!("driver not ready: {value}"),
			Err(err) => last_error = err.to_string(),
		}
	}
	Err(FanoutError::Context(format!("driver on {endpoint} never became ready: {last_error}")))
}

#[async_trait]
impl SessionLauncher for DriverLauncher {
	fn tier(&self) -> &str {
		self.tier.name()
	}

	async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Box<dyn AutomationSession>> {
		let driver = self.resolve_driver().await.map_err(|e| FanoutError::Context(e.to_string()))?;
		let endpoint = format!("http://127.0.0.1:{}", request.port);
		debug!(target: "fanout.webdriver", tier = %self.tier, account = %request.account, driver = %driver.display(), %endpoint, "starting driver");

		let mut child = spawn_driver(&driver, request.port)?;
		wait_ready(&self.client, &endpoint, &mut child).await?;

		let created = send(&self.client, Method::POST, &format!("{endpoint}/session"), Some(self.capabilities(request)))
			.await
			.map_err(|e| FanoutError::Context(format!("session not created: {e}")))?;
		let session_id = created
			.get("sessionId")
			.and_then(Value::as_str)
			.ok_or_else(|| FanoutError::Context(format!("driver returned no session id: {created}")))?
			.to_string();

		info!(target: "fanout.webdriver", tier = %self.tier, account = %request.account, port = request.port, session = %session_id, "browser session started");
		Ok(Box::new(WebDriverSession::new(self.client.clone(), endpoint, session_id, Some(child))))
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn launcher(config: SessionConfig) -> DriverLauncher {
		DriverLauncher::new(DriverTier::Bundled, Arc::new(config)).unwrap()
	}

	#[test]
	fn headless_request_adds_headless_flags() {
		let launcher = launcher(SessionConfig::default());
		let request = LaunchRequest {
			account: "alice",
			port: 9311,
			headless: true,
			profile_dir: Some(PathBuf::from("/tmp/profiles/alice")),
		};
		let caps = launcher.capabilities(&request);
		let args: Vec<&str> = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
			.as_array()
			.unwrap()
			.iter()
			.filter_map(Value::as_str)
			.collect();
		assert!(args.contains(&"--headless=new"));
		assert!(args.contains(&"--user-data-dir=/tmp/profiles/alice"));
	}

	#[test]
	fn browser_binary_is_forwarded() {
		let launcher = launcher(SessionConfig {
			browser_binary: Some(PathBuf::from("/opt/chrome/chrome")),
			..SessionConfig::default()
		});
		let request = LaunchRequest {
			account: "alice",
			port: 9311,
			headless: false,
			profile_dir: None,
		};
		let caps = launcher.capabilities(&request);
		assert_eq!(caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["binary"], "/opt/chrome/chrome");
	}

	#[test]
	fn tiers_are_ordered() {
		let launchers = driver_launchers(Arc::new(SessionConfig::default())).unwrap();
		let names: Vec<_> = launchers.iter().map(|l| l.tier().to_string()).collect();
		assert_eq!(names, ["bundled", "host", "fetched"]);
	}

	#[tokio::test]
	async fn missing_driver_fails_launch() {
		let temp = tempfile::TempDir::new().unwrap();
		let launcher = launcher(SessionConfig {
			bundled_driver: temp.path().join("nope"),
			..SessionConfig::default()
		});
		let request = LaunchRequest {
			account: "alice",
			port: 9311,
			headless: true,
			profile_dir: None,
		};
		assert!(launcher.launch(&request).await.is_err());
	}
}
