//! H3 OpenAPI ledger backend.
//!
//! Records live in one form (`schema_code`) of one H3 application
//! (`app_code`). Listing is a POST with offset/limit paging; updates are a
//! PATCH per row keyed by the row's `ObjectId`.

use crate::{LedgerError, LedgerInterface, RawRecord, RecordPage};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use sync_types::{
	http_url, non_empty_string, truncate_chars, ConfigSchema, Field, FieldType,
	ImplementationRegistry, Schema, SecretString, ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Longest response excerpt carried in a parse error.
const BODY_EXCERPT_CHARS: usize = 500;

/// Ledger backed by the H3 OpenAPI.
pub struct H3Ledger {
	client: reqwest::Client,
	/// Base URL including the `/openapi` suffix.
	api_base: String,
	app_token: SecretString,
	app_code: String,
	schema_code: String,
	engine_code: Option<String>,
}

impl H3Ledger {
	pub fn new(
		base_url: &str,
		app_token: SecretString,
		app_code: impl Into<String>,
		schema_code: impl Into<String>,
		engine_code: Option<String>,
		timeout: Duration,
	) -> Result<Self, LedgerError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| LedgerError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			api_base: format!("{}/openapi", base_url.trim().trim_end_matches('/')),
			app_token,
			app_code: app_code.into(),
			schema_code: schema_code.into(),
			engine_code: engine_code.filter(|c| !c.trim().is_empty()),
		})
	}

	fn request(&self, method: Method, url: &str) -> RequestBuilder {
		let token = self.app_token.with_exposed(|t| t.trim().to_string());
		let builder = self
			.client
			.request(method, url)
			.bearer_auth(token)
			.header("X-H3-AppCode", &self.app_code);
		match &self.engine_code {
			Some(engine_code) => builder.header("X-H3-EngineCode", engine_code),
			None => builder,
		}
	}

	/// Checks the status and parses the body as JSON.
	async fn read_json(response: Response) -> Result<Value, LedgerError> {
		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		if !status.is_success() {
			return Err(LedgerError::Http {
				status: status.as_u16(),
				body,
			});
		}

		serde_json::from_str(&body).map_err(|_| {
			LedgerError::Parse(format!(
				"JSON parse error on: {}",
				truncate_chars(&body, BODY_EXCERPT_CHARS)
			))
		})
	}
}

#[async_trait]
impl LedgerInterface for H3Ledger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(H3LedgerSchema)
	}

	async fn fetch_page(&self, offset: usize, limit: usize) -> Result<RecordPage, LedgerError> {
		let url = format!("{}/records/{}/{}", self.api_base, self.app_code, self.schema_code);
		let response = self
			.request(Method::POST, &url)
			.json(&json!({ "offset": offset, "limit": limit, "filters": [] }))
			.send()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		let body = Self::read_json(response).await?;
		let records: Vec<RawRecord> = body
			.pointer("/data/records")
			.and_then(Value::as_array)
			.map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
			.unwrap_or_default();

		let has_more = records.len() >= limit;
		Ok(RecordPage { records, has_more })
	}

	async fn patch_record(&self, row_id: &str, fields: RawRecord) -> Result<(), LedgerError> {
		let url = format!(
			"{}/record/{}/{}/{}",
			self.api_base, self.app_code, self.schema_code, row_id
		);
		let response = self
			.request(Method::PATCH, &url)
			.json(&fields)
			.send()
			.await
			.map_err(|e| LedgerError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(LedgerError::Http {
				status: status.as_u16(),
				body,
			});
		}
		Ok(())
	}
}

/// Configuration schema for the H3 ledger.
pub struct H3LedgerSchema;

impl ConfigSchema for H3LedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("base_url", FieldType::String).with_validator(http_url),
				Field::new("app_token", FieldType::String).with_validator(non_empty_string),
				Field::new("app_code", FieldType::String).with_validator(non_empty_string),
				Field::new("schema_code", FieldType::String).with_validator(non_empty_string),
			],
			vec![
				Field::new("engine_code", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the H3 ledger.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "h3";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}

/// Builds an H3 ledger from its configuration table.
///
/// Required: `base_url`, `app_token`, `app_code`, `schema_code`.
/// Optional: `engine_code`, `timeout_seconds` (default 30).
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	H3LedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let text = |key: &str| {
		config
			.get(key)
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or_default()
	};
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	let ledger = H3Ledger::new(
		&text("base_url"),
		SecretString::from(text("app_token")),
		text("app_code"),
		text("schema_code"),
		config
			.get("engine_code")
			.and_then(|v| v.as_str())
			.map(str::to_string),
		Duration::from_secs(timeout),
	)?;
	Ok(Box::new(ledger))
}
