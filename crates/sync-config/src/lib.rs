//! Configuration for the order sync service.
//!
//! Configuration is a TOML file with `${VAR}` / `${VAR:-default}` placeholders
//! resolved from the environment before parsing. Credentials such as the
//! ledger token and the fulfillment client secret are normally supplied this
//! way.
//!
//! ## Modular Configuration Support
//!
//! A file may pull in others with `include = ["ledger.toml", ...]`. Each
//! top-level section must appear in exactly one file.

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The full error embeds the whole input; the message is enough.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub sync: SyncConfig,
	pub ledger: LedgerConfig,
	pub fulfillment: FulfillmentConfig,
	/// Scheduled triggers; absent means manual triggers only.
	pub schedule: Option<ScheduleConfig>,
	/// HTTP API server; absent means no server.
	pub api: Option<ApiConfig>,
}

/// Pass limits shared by both drivers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	/// Instance name used in logs.
	pub id: String,
	/// Maximum distinct orders consolidated per submission pass.
	#[serde(default = "default_max_orders_per_run")]
	pub max_orders_per_run: usize,
	#[serde(default = "default_submit_deadline_seconds")]
	pub submit_deadline_seconds: u64,
	#[serde(default = "default_reconcile_deadline_seconds")]
	pub reconcile_deadline_seconds: u64,
	/// Order numbers per tracking query.
	#[serde(default = "default_reconcile_batch_size")]
	pub reconcile_batch_size: usize,
}

impl SyncConfig {
	pub fn submit_deadline(&self) -> Duration {
		Duration::from_secs(self.submit_deadline_seconds)
	}

	pub fn reconcile_deadline(&self) -> Duration {
		Duration::from_secs(self.reconcile_deadline_seconds)
	}
}

fn default_max_orders_per_run() -> usize {
	20
}

fn default_submit_deadline_seconds() -> u64 {
	25
}

fn default_reconcile_deadline_seconds() -> u64 {
	40
}

fn default_reconcile_batch_size() -> usize {
	20
}

/// Source ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
	/// Records requested per page while draining the ledger.
	#[serde(default = "default_page_size")]
	pub page_size: usize,
	/// Overrides of the logical field name to ledger field code table.
	#[serde(default)]
	pub fields: HashMap<String, String>,
	#[serde(default)]
	pub defaults: RecordDefaults,
}

fn default_page_size() -> usize {
	100
}

/// Values the normalizer fills in when a ledger row leaves a field blank.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordDefaults {
	#[serde(default = "default_ship_from")]
	pub ship_from: String,
	#[serde(default = "default_sales_channel")]
	pub sales_channel: String,
}

impl Default for RecordDefaults {
	fn default() -> Self {
		Self {
			ship_from: default_ship_from(),
			sales_channel: default_sales_channel(),
		}
	}
}

fn default_ship_from() -> String {
	"Mercari Lifestyle".to_string()
}

fn default_sales_channel() -> String {
	"Other".to_string()
}

/// Fulfillment API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FulfillmentConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	#[serde(default)]
	pub retry: RetryConfig,
	#[serde(default)]
	pub duplicates: DuplicateConfig,
}

/// Exponential backoff applied to outbound fulfillment calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryConfig {
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Unit of the `2^attempt` delay.
	#[serde(default = "default_base_delay_ms")]
	pub base_delay_ms: u64,
}

impl RetryConfig {
	pub fn base_delay(&self) -> Duration {
		Duration::from_millis(self.base_delay_ms)
	}
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: default_max_retries(),
			base_delay_ms: default_base_delay_ms(),
		}
	}
}

fn default_max_retries() -> u32 {
	3
}

fn default_base_delay_ms() -> u64 {
	1000
}

/// How a provider error is recognized as "order already exists".
///
/// `codes` are exact provider error codes and are checked first. `markers`
/// are substrings of the provider message, used when the provider gives no
/// usable code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DuplicateConfig {
	#[serde(default)]
	pub codes: Vec<String>,
	#[serde(default = "default_duplicate_markers")]
	pub markers: Vec<String>,
}

impl Default for DuplicateConfig {
	fn default() -> Self {
		Self {
			codes: Vec::new(),
			markers: default_duplicate_markers(),
		}
	}
}

fn default_duplicate_markers() -> Vec<String> {
	vec!["exists".to_string(), "重复".to_string()]
}

/// Hours (UTC) at which each pass is triggered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScheduleConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_submit_hours")]
	pub submit_hours_utc: Vec<u32>,
	#[serde(default = "default_reconcile_hours")]
	pub reconcile_hours_utc: Vec<u32>,
}

impl Default for ScheduleConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			submit_hours_utc: default_submit_hours(),
			reconcile_hours_utc: default_reconcile_hours(),
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_submit_hours() -> Vec<u32> {
	vec![2, 5]
}

fn default_reconcile_hours() -> Vec<u32> {
	vec![9]
}

/// HTTP API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
///
/// Input is capped at 1MB so the regex scan stays bounded.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last_end = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						name.as_str()
					)))
				},
			},
		};
		resolved.push_str(&input[last_end..whole.start()]);
		resolved.push_str(&value);
		last_end = whole.end();
	}
	resolved.push_str(&input[last_end..]);

	Ok(resolved)
}

impl Config {
	/// Loads a configuration file, following `include` directives relative to
	/// the file's directory.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;

		let mut loader = loader::ConfigLoader::new(base_dir);
		loader.load_config(file_name).await
	}

	/// Builds a validated config from an already env-resolved TOML value.
	pub(crate) fn from_value(value: toml::Value) -> Result<Self, ConfigError> {
		let config: Config = value.try_into()?;
		config.validate()?;
		Ok(config)
	}

	/// Cross-field checks that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.sync.id.trim().is_empty() {
			return Err(ConfigError::Validation("Sync ID cannot be empty".into()));
		}
		if self.sync.max_orders_per_run == 0 {
			return Err(ConfigError::Validation(
				"sync.max_orders_per_run must be greater than 0".into(),
			));
		}
		if self.sync.submit_deadline_seconds == 0 || self.sync.reconcile_deadline_seconds == 0 {
			return Err(ConfigError::Validation(
				"sync deadlines must be greater than 0".into(),
			));
		}
		if !(1..=100).contains(&self.sync.reconcile_batch_size) {
			return Err(ConfigError::Validation(format!(
				"sync.reconcile_batch_size must be between 1 and 100, got {}",
				self.sync.reconcile_batch_size
			)));
		}

		if self.ledger.page_size == 0 {
			return Err(ConfigError::Validation(
				"ledger.page_size must be greater than 0".into(),
			));
		}
		check_primary("ledger", &self.ledger.primary, &self.ledger.implementations)?;
		check_primary(
			"fulfillment",
			&self.fulfillment.primary,
			&self.fulfillment.implementations,
		)?;

		if let Some(schedule) = &self.schedule {
			validate_schedule(schedule)?;
		}

		Ok(())
	}
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

fn validate_schedule(schedule: &ScheduleConfig) -> Result<(), ConfigError> {
	let all_hours = schedule
		.submit_hours_utc
		.iter()
		.chain(&schedule.reconcile_hours_utc);
	if let Some(hour) = all_hours.clone().find(|h| **h > 23) {
		return Err(ConfigError::Validation(format!(
			"Schedule hour {} is outside 0..=23",
			hour
		)));
	}
	if let Some(hour) = schedule
		.submit_hours_utc
		.iter()
		.find(|h| schedule.reconcile_hours_utc.contains(h))
	{
		return Err(ConfigError::Validation(format!(
			"Hour {} is scheduled for both submit and reconcile",
			hour
		)));
	}
	if schedule.enabled && all_hours.count() == 0 {
		return Err(ConfigError::Validation(
			"Schedule is enabled but no hours are configured".into(),
		));
	}
	Ok(())
}

/// Parses a TOML string: resolves environment placeholders, deserializes and
/// validates. Includes are not followed; use [`Config::from_file`] for that.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let value: toml::Value = toml::from_str(&resolved)?;
		Config::from_value(value)
	}
}
