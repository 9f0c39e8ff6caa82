//! HTTP catalog lookup used to validate reference ids.
//!
//! The catalog answers `{"code": 0, "data": {"successList": [...], "failList": [...]}}`.
//! Only an entry in `failList` counts as a rejection; every other failure
//! (transport, HTTP status, non-zero code, empty answer) is transient.
//!
//! With a cart endpoint configured, an accepted entry is echoed back to it so
//! the publish flow can attach it. A failed add is transient too.

use std::time::Duration;

use async_trait::async_trait;
use fanout::validate::{Validation, Validator};
use fanout::{FanoutError, Result};
use fanout_protocol::{Cookie, ItemDescription, cookie_header};
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
	code: i64,
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	data: Option<LookupData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupData {
	#[serde(default)]
	success_list: Vec<Value>,
	#[serde(default)]
	fail_list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartResponse {
	code: i64,
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	data: Option<CartData>,
}

#[derive(Debug, Default, Deserialize)]
struct CartData {
	#[serde(default)]
	infos: Vec<CartInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartInfo {
	res_code: i64,
	#[serde(default)]
	res_msg: Option<String>,
}

/// Verdict plus the raw accepted entry, which the cart add sends back unchanged.
#[derive(Debug)]
struct Lookup {
	verdict: Validation,
	entry: Option<Value>,
}

pub struct HttpCatalog {
	client: Client,
	endpoint: String,
	cart_endpoint: Option<String>,
	reference_url_template: String,
}

impl HttpCatalog {
	pub fn new(endpoint: impl Into<String>, config: &CatalogConfig) -> Result<Self> {
		let endpoint = endpoint.into();
		for url in std::iter::once(&endpoint).chain(config.cart_endpoint.as_ref()) {
			url::Url::parse(url).map_err(|e| FanoutError::Context(format!("Invalid catalog endpoint {url}: {e}")))?;
		}
		let client = Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.map_err(|e| FanoutError::Context(format!("Failed to create HTTP client: {e}")))?;
		Ok(Self {
			client,
			endpoint,
			cart_endpoint: config.cart_endpoint.clone(),
			reference_url_template: config.reference_url_template.clone(),
		})
	}

	pub fn reference_url(&self, reference: &str) -> String {
		self.reference_url_template.replace("{reference}", reference)
	}

	fn post(&self, url: &str, credentials: &[Cookie]) -> RequestBuilder {
		self.client
			.post(url)
			.header(CONTENT_TYPE, "application/json")
			.header(USER_AGENT, BROWSER_USER_AGENT)
			.header(COOKIE, cookie_header(credentials))
	}

	async fn add_to_cart(&self, cart: &str, reference: &str, entry: &Value, credentials: &[Cookie]) -> Result<()> {
		debug!(target: "fanout.catalog", %reference, "adding to selection cart");
		let body: CartResponse = send(self.post(cart, credentials).json(&cart_body(entry)), "cart").await?;
		interpret_cart(body)?;
		info!(target: "fanout.catalog", %reference, "added to selection cart");
		Ok(())
	}
}

/// Sends a request and decodes a JSON answer. Every failure is transient.
async fn send<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
	let response = request
		.send()
		.await
		.map_err(|e| FanoutError::Validation(format!("{what} request failed: {e}")))?;
	let status = response.status();
	if !status.is_success() {
		return Err(FanoutError::Validation(format!("{what} returned HTTP {status}")));
	}
	response
		.json()
		.await
		.map_err(|e| FanoutError::Validation(format!("unreadable {what} response: {e}")))
}

/// Cart-add payload for one accepted catalog entry.
fn cart_body(entry: &Value) -> Value {
	let mut goods = entry.clone();
	if let Some(fields) = goods.as_object_mut() {
		fields.insert("success".to_string(), Value::Bool(true));
	}
	json!({
		"goods": [goods],
		"operateSource": 2,
		"bizExtraInfo": "",
		"fromType": 12,
	})
}

fn interpret_cart(response: CartResponse) -> Result<()> {
	if response.code != 0 {
		return Err(FanoutError::Validation(format!(
			"cart returned code {}: {}",
			response.code,
			response.message.unwrap_or_default()
		)));
	}
	match response.data.unwrap_or_default().infos.into_iter().next() {
		Some(info) if info.res_code == 0 => Ok(()),
		Some(info) => Err(FanoutError::Validation(format!(
			"cart add refused ({}): {}",
			info.res_code,
			info.res_msg.unwrap_or_default()
		))),
		None => Err(FanoutError::Validation("cart add returned no result".to_string())),
	}
}

/// Interprets one catalog answer.
fn interpret(reference: &str, response: LookupResponse) -> Result<Lookup> {
	if response.code != 0 {
		return Err(FanoutError::Validation(format!(
			"catalog returned code {}: {}",
			response.code,
			response.message.unwrap_or_default()
		)));
	}
	let data = response.data.unwrap_or_default();
	if let Some(found) = data.success_list.first() {
		let text = |key: &str| found.get(key).and_then(Value::as_str).map(str::to_string);
		let number = |key: &str| {
			found
				.get(key)
				.and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
		};
		let external_id = text("itemId")
			.or_else(|| found.get("itemId").and_then(Value::as_i64).map(|id| id.to_string()))
			.unwrap_or_else(|| reference.to_string());
		let verdict = Validation::Accepted(ItemDescription {
			external_id,
			name: text("goodsName").unwrap_or_default(),
			price: number("price"),
			commission: number("commissionFee"),
		});
		return Ok(Lookup {
			verdict,
			entry: Some(found.clone()),
		});
	}
	if let Some(failed) = data.fail_list.first() {
		let reason = failed
			.get("distinguishTips")
			.and_then(Value::as_str)
			.unwrap_or("rejected by catalog")
			.to_string();
		return Ok(Lookup {
			verdict: Validation::Rejected(reason),
			entry: None,
		});
	}
	Err(FanoutError::Validation("catalog returned an empty result".to_string()))
}

#[async_trait]
impl Validator for HttpCatalog {
	async fn validate(&self, reference: &str, credentials: &[Cookie]) -> Result<Validation> {
		let item_url = self.reference_url(reference);
		debug!(target: "fanout.catalog", %reference, url = %item_url, "looking up reference");

		let body: LookupResponse = send(self.post(&self.endpoint, credentials).json(&json!({ "itemUrls": item_url })), "catalog").await?;

		let Lookup { verdict, entry } = interpret(reference, body)?;
		match &verdict {
			Validation::Accepted(item) => info!(target: "fanout.catalog", %reference, name = %item.name, price = ?item.price, "reference accepted"),
			Validation::Rejected(reason) => info!(target: "fanout.catalog", %reference, %reason, "reference rejected"),
		}
		if let (Some(cart), Some(entry)) = (&self.cart_endpoint, &entry) {
			if let Err(err) = self.add_to_cart(cart, reference, entry, credentials).await {
				warn!(target: "fanout.catalog", %reference, error = %err, "selection cart add failed");
				return Err(err);
			}
		}
		Ok(verdict)
	}
}
