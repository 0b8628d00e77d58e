//! Source ledger access for the order sync system.
//!
//! The ledger is an external record store holding one row per order line.
//! Backends implement [`LedgerInterface`], which deals only in raw field maps
//! keyed by the ledger's own field codes. [`LedgerService`] drains pagination,
//! runs every row through the [`Normalizer`] and translates write-backs, so
//! nothing outside this crate ever sees a raw field code.

use async_trait::async_trait;
use sync_types::{ConfigSchema, ImplementationRegistry, RecordPatch, SourceRecord};
use thiserror::Error;

pub mod normalizer;

pub use normalizer::{FieldMapping, LedgerField, NormalizeError, Normalizer};

pub mod implementations {
	pub mod h3;
	pub mod memory;
}

/// A ledger row as returned by the backend: field code to JSON value.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur while talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Ledger returned HTTP {status}: {body}")]
	Http { status: u16, body: String },
	#[error("Invalid ledger response: {0}")]
	Parse(String),
	#[error("Record not found: {0}")]
	NotFound(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// One page of raw records.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
	pub records: Vec<RawRecord>,
	/// True when the page was full and another page may follow.
	pub has_more: bool,
}

/// Low-level interface every ledger backend implements.
#[async_trait]
pub trait LedgerInterface: Send + Sync {
	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fetches `limit` records starting at `offset`. No server-side filter is
	/// applied; callers filter after normalization.
	async fn fetch_page(&self, offset: usize, limit: usize) -> Result<RecordPage, LedgerError>;

	/// Writes the given field codes on one row.
	async fn patch_record(&self, row_id: &str, fields: RawRecord) -> Result<(), LedgerError>;
}

/// Factory signature for ledger backends.
pub type LedgerFactory = fn(&toml::Value) -> Result<Box<dyn LedgerInterface>, LedgerError>;

/// Registry trait for ledger implementations.
pub trait LedgerRegistry: ImplementationRegistry<Factory = LedgerFactory> {}

/// Returns every built-in ledger backend as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{h3, memory};

	vec![
		(h3::Registry::NAME, h3::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Everything read from the ledger in one drain.
#[derive(Debug, Default)]
pub struct LedgerSnapshot {
	/// Rows that normalized cleanly, in ledger order.
	pub records: Vec<SourceRecord>,
	/// Rows the normalizer refused.
	pub rejected: Vec<NormalizeError>,
	/// Raw rows fetched, accepted or not.
	pub total: usize,
}

/// Typed access to the ledger on top of a backend.
pub struct LedgerService {
	backend: Box<dyn LedgerInterface>,
	normalizer: Normalizer,
	page_size: usize,
}

impl LedgerService {
	pub fn new(backend: Box<dyn LedgerInterface>, normalizer: Normalizer, page_size: usize) -> Self {
		Self {
			backend,
			normalizer,
			page_size: page_size.max(1),
		}
	}

	/// Reads every page until the backend reports no more.
	pub async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, LedgerError> {
		let mut all = Vec::new();
		let mut offset = 0;

		loop {
			let page = self.backend.fetch_page(offset, self.page_size).await?;
			let fetched = page.records.len();
			all.extend(page.records);

			tracing::debug!(offset, fetched, total = all.len(), "Fetched ledger page");

			if !page.has_more || fetched == 0 {
				break;
			}
			offset += fetched;
		}

		Ok(all)
	}

	/// Drains the ledger and normalizes every row.
	///
	/// Rejected rows are logged and returned separately; they never fail the
	/// drain.
	pub async fn fetch_records(&self) -> Result<LedgerSnapshot, LedgerError> {
		let raw = self.fetch_raw_records().await?;
		let mut snapshot = LedgerSnapshot {
			total: raw.len(),
			..Default::default()
		};

		for record in &raw {
			match self.normalizer.normalize(record) {
				Ok(normalized) => snapshot.records.push(normalized),
				Err(e) => {
					tracing::warn!(error = %e, "Rejected ledger record");
					snapshot.rejected.push(e);
				},
			}
		}

		Ok(snapshot)
	}

	/// Writes a patch to one row.
	pub async fn apply_patch(&self, row_id: &str, patch: &RecordPatch) -> Result<(), LedgerError> {
		if patch.is_empty() {
			return Ok(());
		}
		let fields = self.normalizer.patch_fields(patch);
		self.backend.patch_record(row_id, fields).await
	}
}
