//! Ledger record types.
//!
//! A `SourceRecord` is one normalized ledger row: a single line item of an
//! order together with the order header fields repeated on every row.
//! Records are produced by the ledger normalizer and are never mutated by
//! the sync engine; changes flow back to the ledger as `RecordPatch`es.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a ledger row.
///
/// The ledger stores these as free text. Parsing is strict: anything outside
/// this set is rejected at normalization time instead of being carried
/// through the engine as an unknown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
	Pending,
	Processed,
	#[serde(rename = "Being Processed")]
	BeingProcessed,
	Paid,
	Unpaid,
	Completed,
	Error,
}

/// Error returned when a ledger status string is not a known status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown record status: {0:?}")]
pub struct UnknownStatus(pub String);

impl RecordStatus {
	/// Every status, in ledger display order.
	pub const ALL: [RecordStatus; 7] = [
		RecordStatus::Pending,
		RecordStatus::Processed,
		RecordStatus::BeingProcessed,
		RecordStatus::Paid,
		RecordStatus::Unpaid,
		RecordStatus::Completed,
		RecordStatus::Error,
	];

	/// The exact text the ledger stores for this status.
	pub fn as_str(&self) -> &'static str {
		match self {
			RecordStatus::Pending => "Pending",
			RecordStatus::Processed => "Processed",
			RecordStatus::BeingProcessed => "Being Processed",
			RecordStatus::Paid => "Paid",
			RecordStatus::Unpaid => "Unpaid",
			RecordStatus::Completed => "Completed",
			RecordStatus::Error => "Error",
		}
	}

	/// Rows in these statuses are picked up by the submission pass.
	pub fn is_submission_eligible(&self) -> bool {
		matches!(self, RecordStatus::Pending | RecordStatus::Error)
	}

	/// Rows in these statuses are polled for tracking by the reconciliation pass.
	pub fn is_reconciliation_eligible(&self) -> bool {
		matches!(
			self,
			RecordStatus::Processed
				| RecordStatus::BeingProcessed
				| RecordStatus::Paid
				| RecordStatus::Unpaid
		)
	}

	/// Checks a status change against the lifecycle table.
	///
	/// A blank status may only be queued (`Pending`). `Completed` is terminal;
	/// writing `Completed` again is accepted as a no-op.
	pub fn is_valid_transition(from: Option<RecordStatus>, to: RecordStatus) -> bool {
		static TRANSITIONS: Lazy<HashMap<RecordStatus, HashSet<RecordStatus>>> = Lazy::new(|| {
			let shipped = HashSet::from([RecordStatus::Completed, RecordStatus::Error]);
			let intake = HashSet::from([
				RecordStatus::Pending,
				RecordStatus::Processed,
				RecordStatus::Error,
			]);
			let mut m = HashMap::new();
			m.insert(RecordStatus::Pending, intake.clone());
			m.insert(RecordStatus::Error, intake);
			m.insert(RecordStatus::Processed, shipped.clone());
			m.insert(RecordStatus::BeingProcessed, shipped.clone());
			m.insert(RecordStatus::Paid, shipped.clone());
			m.insert(RecordStatus::Unpaid, shipped);
			m.insert(RecordStatus::Completed, HashSet::from([RecordStatus::Completed]));
			m
		});

		match from {
			None => to == RecordStatus::Pending,
			Some(from) => TRANSITIONS
				.get(&from)
				.is_some_and(|allowed| allowed.contains(&to)),
		}
	}
}

impl fmt::Display for RecordStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RecordStatus {
	type Err = UnknownStatus;

	/// Parses the ledger text. Surrounding whitespace is ignored, case is not.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		RecordStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == trimmed)
			.ok_or_else(|| UnknownStatus(s.to_string()))
	}
}

/// One normalized ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
	/// Ledger-assigned row identifier used for write-back.
	pub row_id: String,
	/// Business order number; empty when the row carries none.
	pub order_no: String,
	/// `None` when the ledger cell is blank.
	pub status: Option<RecordStatus>,
	pub ship_name: String,
	pub ship_phone: String,
	pub ship_address1: String,
	pub ship_city: String,
	pub ship_state: String,
	pub ship_country: String,
	pub ship_zip_code: String,
	pub ship_email: String,
	pub sku: String,
	/// Signed so that the validator can report negative quantities verbatim.
	pub qty: i64,
	pub item_price: Decimal,
	/// `None` when the ledger did not provide a line number.
	pub line_no: Option<u32>,
	pub sales_channel: String,
	pub ship_from: String,
	pub order_date: Option<String>,
	pub carrier_name: Option<String>,
	pub tracking_no: Option<String>,
}

impl SourceRecord {
	/// A record with the given identity and every other field empty.
	pub fn new(row_id: impl Into<String>, order_no: impl Into<String>) -> Self {
		Self {
			row_id: row_id.into(),
			order_no: order_no.into(),
			status: None,
			ship_name: String::new(),
			ship_phone: String::new(),
			ship_address1: String::new(),
			ship_city: String::new(),
			ship_state: String::new(),
			ship_country: String::new(),
			ship_zip_code: String::new(),
			ship_email: String::new(),
			sku: String::new(),
			qty: 0,
			item_price: Decimal::ZERO,
			line_no: None,
			sales_channel: String::new(),
			ship_from: String::new(),
			order_date: None,
			carrier_name: None,
			tracking_no: None,
		}
	}

	/// Reference to this row used when writing status back.
	pub fn row_ref(&self) -> RowRef {
		RowRef {
			row_id: self.row_id.clone(),
			status: self.status,
		}
	}
}

/// A ledger row identifier paired with the status it had when read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
	pub row_id: String,
	pub status: Option<RecordStatus>,
}

/// Partial update written back to a ledger row.
///
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
	pub status: Option<RecordStatus>,
	pub comment: Option<String>,
	pub carrier_name: Option<String>,
	pub tracking_no: Option<String>,
}

impl RecordPatch {
	/// A status change with an accompanying comment.
	pub fn status(status: RecordStatus, comment: impl Into<String>) -> Self {
		Self {
			status: Some(status),
			comment: Some(comment.into()),
			..Default::default()
		}
	}

	/// Adds carrier and tracking number to the patch.
	pub fn with_shipment(mut self, carrier: impl Into<String>, tracking: impl Into<String>) -> Self {
		self.carrier_name = Some(carrier.into());
		self.tracking_no = Some(tracking.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.status.is_none()
			&& self.comment.is_none()
			&& self.carrier_name.is_none()
			&& self.tracking_no.is_none()
	}
}
