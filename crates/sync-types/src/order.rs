//! Consolidated order types.
//!
//! The ledger stores one row per line item; the fulfillment API wants one
//! order with many lines. `OrderAggregate` is the bridge between the two.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{RecordStatus, RowRef, SourceRecord};

/// Order-level fields, taken from the first row seen for an order number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHeader {
	pub order_no: String,
	pub order_date: Option<String>,
	pub ship_name: String,
	pub ship_phone: String,
	pub ship_address1: String,
	pub ship_city: String,
	pub ship_state: String,
	pub ship_country: String,
	pub ship_zip_code: String,
	pub ship_email: String,
	pub sales_channel: String,
	pub ship_from: String,
}

impl From<&SourceRecord> for OrderHeader {
	fn from(record: &SourceRecord) -> Self {
		Self {
			order_no: record.order_no.clone(),
			order_date: record.order_date.clone(),
			ship_name: record.ship_name.clone(),
			ship_phone: record.ship_phone.clone(),
			ship_address1: record.ship_address1.clone(),
			ship_city: record.ship_city.clone(),
			ship_state: record.ship_state.clone(),
			ship_country: record.ship_country.clone(),
			ship_zip_code: record.ship_zip_code.clone(),
			ship_email: record.ship_email.clone(),
			sales_channel: record.sales_channel.clone(),
			ship_from: record.ship_from.clone(),
		}
	}
}

/// One line of a consolidated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
	pub sku: String,
	pub qty: i64,
	pub line_no: u32,
	pub item_price: Decimal,
}

/// An order assembled from every ledger row sharing its order number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
	pub header: OrderHeader,
	/// Lines in ledger row order.
	pub lines: Vec<LineItem>,
	/// The rows this order was built from, in ledger row order.
	pub rows: Vec<RowRef>,
}

impl OrderAggregate {
	/// Starts an aggregate from its first row; the row contributes the header only.
	pub fn from_first_record(record: &SourceRecord) -> Self {
		Self {
			header: OrderHeader::from(record),
			lines: Vec::new(),
			rows: Vec::new(),
		}
	}

	pub fn order_no(&self) -> &str {
		&self.header.order_no
	}

	pub fn row_ids(&self) -> impl Iterator<Item = &str> {
		self.rows.iter().map(|row| row.row_id.as_str())
	}
}

/// Result of submitting one consolidated order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubmissionOutcome {
	/// The fulfillment API accepted the order.
	Success {
		order_id: Option<String>,
		message: String,
	},
	/// The fulfillment API already knows this order; treated as success.
	AlreadyExists { message: String },
	/// Local validation failed; nothing was sent.
	ValidationFailed { message: String },
	/// The call failed with a retryable error after all retries were spent.
	TransientError { message: String },
	/// The call failed with a non-retryable error.
	FatalError { message: String },
}

impl SubmissionOutcome {
	pub fn message(&self) -> &str {
		match self {
			SubmissionOutcome::Success { message, .. }
			| SubmissionOutcome::AlreadyExists { message }
			| SubmissionOutcome::ValidationFailed { message }
			| SubmissionOutcome::TransientError { message }
			| SubmissionOutcome::FatalError { message } => message,
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(
			self,
			SubmissionOutcome::Success { .. } | SubmissionOutcome::AlreadyExists { .. }
		)
	}

	/// Status written to every row of the order for this outcome.
	pub fn target_status(&self) -> RecordStatus {
		if self.is_success() {
			RecordStatus::Processed
		} else {
			RecordStatus::Error
		}
	}
}

/// Acknowledgement returned by the fulfillment API for a created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedOrder {
	/// Upstream order identifier, when the API returned one.
	pub order_id: Option<String>,
}

/// A single shipment of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingLeg {
	pub carrier_name: Option<String>,
	pub tracking_number: String,
}

/// Shipments known for one order number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
	pub order_no: String,
	pub legs: Vec<TrackingLeg>,
}
