//! In-memory ledger backend.
//!
//! Holds raw rows in process, honours offset/limit paging and applies patches
//! in place. Useful for dry runs and as the ledger in engine tests; clones
//! share the same rows so a test can inspect what the engine wrote.

use crate::{LedgerError, LedgerInterface, RawRecord, RecordPage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use sync_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};
use tokio::sync::RwLock;

const DEFAULT_ROW_ID_FIELD: &str = "ObjectId";

/// In-memory ledger.
#[derive(Clone)]
pub struct MemoryLedger {
	rows: Arc<RwLock<Vec<RawRecord>>>,
	/// Every patch applied, in order, as (row id, fields).
	patches: Arc<RwLock<Vec<(String, RawRecord)>>>,
	row_id_field: String,
	unavailable: Arc<AtomicBool>,
	fetches: Arc<AtomicUsize>,
}

impl MemoryLedger {
	pub fn new() -> Self {
		Self::with_records(Vec::new())
	}

	pub fn with_records(records: Vec<RawRecord>) -> Self {
		Self {
			rows: Arc::new(RwLock::new(records)),
			patches: Arc::new(RwLock::new(Vec::new())),
			row_id_field: DEFAULT_ROW_ID_FIELD.to_string(),
			unavailable: Arc::new(AtomicBool::new(false)),
			fetches: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Uses a different field as the row identifier.
	pub fn with_row_id_field(mut self, field: impl Into<String>) -> Self {
		self.row_id_field = field.into();
		self
	}

	/// Makes every read and write fail with a network error.
	pub fn set_unavailable(&self, unavailable: bool) {
		self.unavailable.store(unavailable, Ordering::SeqCst);
	}

	/// Number of pages served so far.
	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	/// Current contents of one row.
	pub async fn record(&self, row_id: &str) -> Option<RawRecord> {
		let rows = self.rows.read().await;
		rows.iter().find(|r| self.matches(r, row_id)).cloned()
	}

	pub async fn patches(&self) -> Vec<(String, RawRecord)> {
		self.patches.read().await.clone()
	}

	fn matches(&self, record: &RawRecord, row_id: &str) -> bool {
		match record.get(&self.row_id_field) {
			Some(serde_json::Value::String(s)) => s == row_id,
			Some(serde_json::Value::Number(n)) => n.to_string() == row_id,
			_ => false,
		}
	}

	fn check_available(&self) -> Result<(), LedgerError> {
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(LedgerError::Network("memory ledger is unavailable".into()));
		}
		Ok(())
	}
}

impl Default for MemoryLedger {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl LedgerInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	async fn fetch_page(&self, offset: usize, limit: usize) -> Result<RecordPage, LedgerError> {
		self.check_available()?;
		self.fetches.fetch_add(1, Ordering::SeqCst);

		let rows = self.rows.read().await;
		let records: Vec<RawRecord> = rows.iter().skip(offset).take(limit).cloned().collect();
		let has_more = records.len() == limit;
		Ok(RecordPage { records, has_more })
	}

	async fn patch_record(&self, row_id: &str, fields: RawRecord) -> Result<(), LedgerError> {
		self.check_available()?;

		let mut rows = self.rows.write().await;
		let row = rows
			.iter_mut()
			.find(|r| self.matches(r, row_id))
			.ok_or_else(|| LedgerError::NotFound(row_id.to_string()))?;
		for (key, value) in &fields {
			row.insert(key.clone(), value.clone());
		}
		drop(rows);

		self.patches
			.write()
			.await
			.push((row_id.to_string(), fields));
		Ok(())
	}
}

/// Configuration schema for the memory ledger.
///
/// - `row_id_field` (optional): field holding the row identifier
/// - `records` (optional): seed rows as an array of tables
pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("row_id_field", FieldType::String),
				Field::new(
					"records",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(vec![], vec![])))),
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the memory ledger.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::LedgerFactory;

	fn factory() -> Self::Factory {
		create_ledger
	}
}

impl crate::LedgerRegistry for Registry {}

/// Builds a memory ledger, seeding it from `records` when present.
pub fn create_ledger(config: &toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError> {
	MemoryLedgerSchema
		.validate(config)
		.map_err(|e| LedgerError::Configuration(e.to_string()))?;

	let records = match config.get("records") {
		Some(value) => {
			let json = serde_json::to_value(value)
				.map_err(|e| LedgerError::Configuration(e.to_string()))?;
			serde_json::from_value::<Vec<RawRecord>>(json)
				.map_err(|e| LedgerError::Configuration(e.to_string()))?
		},
		None => Vec::new(),
	};

	let mut ledger = MemoryLedger::with_records(records);
	if let Some(field) = config.get("row_id_field").and_then(|v| v.as_str()) {
		ledger = ledger.with_row_id_field(field);
	}
	Ok(Box::new(ledger))
}
