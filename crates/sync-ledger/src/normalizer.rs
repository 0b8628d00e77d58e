//! Record normalization.
//!
//! The ledger addresses every column by an opaque field code (`F00000AL3`
//! and friends). [`FieldMapping`] is the single table that knows those codes;
//! [`Normalizer`] uses it in both directions: raw row to [`SourceRecord`] on
//! read, and [`RecordPatch`] to raw field map on write.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use sync_config::RecordDefaults;
use sync_types::{RecordPatch, RecordStatus, SourceRecord};
use thiserror::Error;

use crate::{LedgerError, RawRecord};

/// Logical ledger columns used by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerField {
	RowId,
	Status,
	OrderNo,
	ShipName,
	ShipPhone,
	ShipAddress1,
	ShipCity,
	ShipState,
	ShipCountry,
	ShipZipCode,
	ShipEmail,
	ShipFrom,
	SalesChannel,
	Sku,
	Qty,
	ItemPrice,
	LineNo,
	OrderDate,
	Comments,
	CarrierName,
	TrackingNo,
}

impl LedgerField {
	pub const ALL: [LedgerField; 21] = [
		LedgerField::RowId,
		LedgerField::Status,
		LedgerField::OrderNo,
		LedgerField::ShipName,
		LedgerField::ShipPhone,
		LedgerField::ShipAddress1,
		LedgerField::ShipCity,
		LedgerField::ShipState,
		LedgerField::ShipCountry,
		LedgerField::ShipZipCode,
		LedgerField::ShipEmail,
		LedgerField::ShipFrom,
		LedgerField::SalesChannel,
		LedgerField::Sku,
		LedgerField::Qty,
		LedgerField::ItemPrice,
		LedgerField::LineNo,
		LedgerField::OrderDate,
		LedgerField::Comments,
		LedgerField::CarrierName,
		LedgerField::TrackingNo,
	];

	/// Name used for this column under `[ledger.fields]`.
	pub fn key(&self) -> &'static str {
		match self {
			LedgerField::RowId => "row_id",
			LedgerField::Status => "status",
			LedgerField::OrderNo => "order_no",
			LedgerField::ShipName => "ship_name",
			LedgerField::ShipPhone => "ship_phone",
			LedgerField::ShipAddress1 => "ship_address1",
			LedgerField::ShipCity => "ship_city",
			LedgerField::ShipState => "ship_state",
			LedgerField::ShipCountry => "ship_country",
			LedgerField::ShipZipCode => "ship_zip_code",
			LedgerField::ShipEmail => "ship_email",
			LedgerField::ShipFrom => "ship_from",
			LedgerField::SalesChannel => "sales_channel",
			LedgerField::Sku => "sku",
			LedgerField::Qty => "qty",
			LedgerField::ItemPrice => "item_price",
			LedgerField::LineNo => "line_no",
			LedgerField::OrderDate => "order_date",
			LedgerField::Comments => "comments",
			LedgerField::CarrierName => "carrier_name",
			LedgerField::TrackingNo => "tracking_no",
		}
	}

	/// Field code of the production shipment form.
	fn default_code(&self) -> &'static str {
		match self {
			LedgerField::RowId => "ObjectId",
			LedgerField::Status => "F00000AL3",
			LedgerField::OrderNo => "F00000ALE",
			LedgerField::ShipName => "F00000AL8",
			LedgerField::ShipPhone => "F00000ALA",
			LedgerField::ShipAddress1 => "F00000ALC",
			LedgerField::ShipCity => "F00000ALD",
			LedgerField::ShipState => "F00000ALF",
			LedgerField::ShipCountry => "F00000ALG",
			LedgerField::ShipZipCode => "F00000ALB",
			LedgerField::ShipEmail => "F00000AL9",
			LedgerField::ShipFrom => "F00000AKT",
			LedgerField::SalesChannel => "F00000AKS",
			LedgerField::Sku => "F00000AL5",
			LedgerField::Qty => "F00000AL6",
			LedgerField::ItemPrice => "F00000ALY",
			LedgerField::LineNo => "F00000AL4",
			LedgerField::OrderDate => "F00000ALJ",
			LedgerField::Comments => "F00000ALP",
			LedgerField::CarrierName => "F00000AZW",
			LedgerField::TrackingNo => "F00000AZX",
		}
	}
}

/// Logical column to ledger field code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
	codes: HashMap<LedgerField, String>,
}

impl Default for FieldMapping {
	fn default() -> Self {
		Self {
			codes: LedgerField::ALL
				.into_iter()
				.map(|field| (field, field.default_code().to_string()))
				.collect(),
		}
	}
}

impl FieldMapping {
	/// Default table with the given `[ledger.fields]` overrides applied.
	pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self, LedgerError> {
		let mut mapping = Self::default();
		for (key, code) in overrides {
			let field = LedgerField::ALL
				.into_iter()
				.find(|f| f.key() == key)
				.ok_or_else(|| {
					LedgerError::Configuration(format!("Unknown ledger field '{}'", key))
				})?;
			if code.trim().is_empty() {
				return Err(LedgerError::Configuration(format!(
					"Field code for '{}' cannot be empty",
					key
				)));
			}
			mapping.codes.insert(field, code.trim().to_string());
		}
		Ok(mapping)
	}

	pub fn code(&self, field: LedgerField) -> &str {
		self.codes
			.get(&field)
			.map(String::as_str)
			.unwrap_or_else(|| field.default_code())
	}
}

/// Reasons a raw row cannot become a [`SourceRecord`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("Record has no row identifier")]
	MissingRowId,
	#[error("Record {row_id} has unknown status {value:?}")]
	UnknownStatus { row_id: String, value: String },
}

/// Maps raw ledger rows to records and patches to raw field maps.
#[derive(Debug, Clone)]
pub struct Normalizer {
	mapping: FieldMapping,
	defaults: RecordDefaults,
}

impl Normalizer {
	pub fn new(mapping: FieldMapping, defaults: RecordDefaults) -> Self {
		Self { mapping, defaults }
	}

	pub fn mapping(&self) -> &FieldMapping {
		&self.mapping
	}

	/// Normalizes one raw row.
	///
	/// Missing optional fields take their defaults; quantity, price and line
	/// number fall back to zero / not provided. A missing order number yields
	/// an empty order number rather than an error.
	pub fn normalize(&self, raw: &RawRecord) -> Result<SourceRecord, NormalizeError> {
		let row_id = self.text(raw, LedgerField::RowId).ok_or(NormalizeError::MissingRowId)?;

		let status = match self.text(raw, LedgerField::Status) {
			None => None,
			Some(value) => Some(RecordStatus::from_str(&value).map_err(|_| {
				NormalizeError::UnknownStatus {
					row_id: row_id.clone(),
					value,
				}
			})?),
		};

		let line_no = self
			.text(raw, LedgerField::LineNo)
			.map(|v| leading_integer(&v))
			.and_then(|n| u32::try_from(n).ok())
			.filter(|n| *n > 0);

		Ok(SourceRecord {
			order_no: self.text_or_empty(raw, LedgerField::OrderNo),
			status,
			ship_name: self.text_or_empty(raw, LedgerField::ShipName),
			ship_phone: self.text_or_empty(raw, LedgerField::ShipPhone),
			ship_address1: self.text_or_empty(raw, LedgerField::ShipAddress1),
			ship_city: self.text_or_empty(raw, LedgerField::ShipCity),
			ship_state: self.text_or_empty(raw, LedgerField::ShipState),
			ship_country: self.text_or_empty(raw, LedgerField::ShipCountry),
			ship_zip_code: self.text_or_empty(raw, LedgerField::ShipZipCode),
			ship_email: self.text_or_empty(raw, LedgerField::ShipEmail),
			sku: self.text_or_empty(raw, LedgerField::Sku),
			qty: self
				.text(raw, LedgerField::Qty)
				.map(|v| leading_integer(&v))
				.unwrap_or(0),
			item_price: self
				.text(raw, LedgerField::ItemPrice)
				.map(|v| leading_decimal(&v))
				.unwrap_or(Decimal::ZERO),
			line_no,
			sales_channel: self
				.text(raw, LedgerField::SalesChannel)
				.unwrap_or_else(|| self.defaults.sales_channel.clone()),
			ship_from: self
				.text(raw, LedgerField::ShipFrom)
				.unwrap_or_else(|| self.defaults.ship_from.clone()),
			order_date: self.text(raw, LedgerField::OrderDate),
			carrier_name: self.text(raw, LedgerField::CarrierName),
			tracking_no: self.text(raw, LedgerField::TrackingNo),
			row_id,
		})
	}

	/// Raw field map for a write-back. Only fields set on the patch appear.
	pub fn patch_fields(&self, patch: &RecordPatch) -> RawRecord {
		let mut fields = RawRecord::new();
		let mut set = |field: LedgerField, value: &str| {
			fields.insert(
				self.mapping.code(field).to_string(),
				Value::String(value.to_string()),
			);
		};

		if let Some(status) = patch.status {
			set(LedgerField::Status, status.as_str());
		}
		if let Some(comment) = &patch.comment {
			set(LedgerField::Comments, comment);
		}
		if let Some(carrier) = &patch.carrier_name {
			set(LedgerField::CarrierName, carrier);
		}
		if let Some(tracking) = &patch.tracking_no {
			set(LedgerField::TrackingNo, tracking);
		}
		fields
	}

	fn text(&self, raw: &RawRecord, field: LedgerField) -> Option<String> {
		raw.get(self.mapping.code(field)).and_then(value_text)
	}

	fn text_or_empty(&self, raw: &RawRecord, field: LedgerField) -> String {
		self.text(raw, field).unwrap_or_default()
	}
}

/// Text of a raw cell. Select fields arrive as single-element arrays.
fn value_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => {
			let trimmed = s.trim();
			(!trimmed.is_empty()).then(|| trimmed.to_string())
		},
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		Value::Array(items) => items.first().and_then(value_text),
		Value::Null | Value::Object(_) => None,
	}
}

/// Leading signed integer of `text`; zero when there is none.
fn leading_integer(text: &str) -> i64 {
	let text = text.trim_start();
	let (negative, rest) = match text.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, text.strip_prefix('+').unwrap_or(text)),
	};
	let end = rest
		.find(|c: char| !c.is_ascii_digit())
		.unwrap_or(rest.len());
	match rest[..end].parse::<i64>() {
		Ok(n) if negative => -n,
		Ok(n) => n,
		Err(_) => 0,
	}
}

/// Leading decimal number of `text`; zero when there is none.
fn leading_decimal(text: &str) -> Decimal {
	let text = text.trim_start();
	let mut end = 0;
	let mut seen_digit = false;
	let mut seen_dot = false;
	for (idx, c) in text.char_indices() {
		match c {
			'+' | '-' if idx == 0 => {},
			'0'..='9' => seen_digit = true,
			'.' if !seen_dot => seen_dot = true,
			_ => break,
		}
		end = idx + c.len_utf8();
	}
	if !seen_digit {
		return Decimal::ZERO;
	}
	let number = text[..end].trim_end_matches('.');
	Decimal::from_str(number).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn normalizer() -> Normalizer {
		Normalizer::new(FieldMapping::default(), RecordDefaults::default())
	}

	fn raw(value: Value) -> RawRecord {
		value.as_object().cloned().unwrap()
	}

	#[test]
	fn test_full_record() {
		let record = normalizer()
			.normalize(&raw(json!({
				"ObjectId": "row-1",
				"F00000AL3": "Pending",
				"F00000ALE": "ORD-1",
				"F00000AL8": "Taro Yamada",
				"F00000ALA": "090-0000-0000",
				"F00000ALC": "1-2-3 Shibuya",
				"F00000ALD": "Tokyo",
				"F00000ALF": "Tokyo-to",
				"F00000ALG": "JP",
				"F00000ALB": "150-0002",
				"F00000AL9": "taro@example.com",
				"F00000AKT": "Osaka DC",
				"F00000AKS": ["Mercari"],
				"F00000AL5": "SKU-1",
				"F00000AL6": "2",
				"F00000ALY": "1500.50",
				"F00000AL4": 3,
				"F00000ALJ": "2024-05-01 10:00:00",
			})))
			.unwrap();

		assert_eq!(record.row_id, "row-1");
		assert_eq!(record.status, Some(RecordStatus::Pending));
		assert_eq!(record.order_no, "ORD-1");
		assert_eq!(record.ship_zip_code, "150-0002");
		assert_eq!(record.sales_channel, "Mercari");
		assert_eq!(record.ship_from, "Osaka DC");
		assert_eq!(record.qty, 2);
		assert_eq!(record.item_price, Decimal::from_str("1500.50").unwrap());
		assert_eq!(record.line_no, Some(3));
		assert_eq!(record.order_date.as_deref(), Some("2024-05-01 10:00:00"));
	}

	#[test]
	fn test_defaults_for_missing_fields() {
		let record = normalizer()
			.normalize(&raw(json!({ "ObjectId": "row-1" })))
			.unwrap();

		assert_eq!(record.order_no, "");
		assert_eq!(record.status, None);
		assert_eq!(record.ship_from, "Mercari Lifestyle");
		assert_eq!(record.sales_channel, "Other");
		assert_eq!(record.ship_email, "");
		assert_eq!(record.qty, 0);
		assert_eq!(record.item_price, Decimal::ZERO);
		assert_eq!(record.line_no, None);
	}

	#[test]
	fn test_configured_defaults() {
		let defaults = RecordDefaults {
			ship_from: "Kobe DC".into(),
			sales_channel: "Shop".into(),
		};
		let record = Normalizer::new(FieldMapping::default(), defaults)
			.normalize(&raw(json!({ "ObjectId": 7 })))
			.unwrap();
		assert_eq!(record.row_id, "7");
		assert_eq!(record.ship_from, "Kobe DC");
		assert_eq!(record.sales_channel, "Shop");
	}

	#[test]
	fn test_lenient_numbers() {
		let record = normalizer()
			.normalize(&raw(json!({
				"ObjectId": "r",
				"F00000AL6": "3 pcs",
				"F00000ALY": "abc",
				"F00000AL4": "0",
			})))
			.unwrap();
		assert_eq!(record.qty, 3);
		assert_eq!(record.item_price, Decimal::ZERO);
		assert_eq!(record.line_no, None);

		assert_eq!(leading_integer("-4"), -4);
		assert_eq!(leading_integer("2.9"), 2);
		assert_eq!(leading_integer(""), 0);
		assert_eq!(leading_decimal("12.5yen"), Decimal::from_str("12.5").unwrap());
		assert_eq!(leading_decimal("7."), Decimal::from(7));
		assert_eq!(leading_decimal("-"), Decimal::ZERO);
	}

	#[test]
	fn test_unknown_status_rejected() {
		let err = normalizer()
			.normalize(&raw(json!({ "ObjectId": "r9", "F00000AL3": "Shipped" })))
			.unwrap_err();
		assert_eq!(
			err,
			NormalizeError::UnknownStatus {
				row_id: "r9".into(),
				value: "Shipped".into()
			}
		);
	}

	#[test]
	fn test_missing_row_id_rejected() {
		let err = normalizer()
			.normalize(&raw(json!({ "F00000ALE": "A" })))
			.unwrap_err();
		assert_eq!(err, NormalizeError::MissingRowId);
	}

	#[test]
	fn test_overrides_change_read_and_write_codes() {
		let overrides = HashMap::from([("status".to_string(), "STATUS_X".to_string())]);
		let normalizer = Normalizer::new(
			FieldMapping::with_overrides(&overrides).unwrap(),
			RecordDefaults::default(),
		);

		let record = normalizer
			.normalize(&raw(json!({ "ObjectId": "r", "STATUS_X": "Error" })))
			.unwrap();
		assert_eq!(record.status, Some(RecordStatus::Error));

		let fields = normalizer.patch_fields(&RecordPatch::status(RecordStatus::Pending, "retry"));
		assert_eq!(fields["STATUS_X"], "Pending");
		assert_eq!(fields["F00000ALP"], "retry");
		assert!(!fields.contains_key("F00000AL3"));
	}

	#[test]
	fn test_unknown_override_rejected() {
		let overrides = HashMap::from([("colour".to_string(), "X".to_string())]);
		assert!(matches!(
			FieldMapping::with_overrides(&overrides),
			Err(LedgerError::Configuration(_))
		));
	}

	#[test]
	fn test_patch_fields_with_shipment() {
		let patch = RecordPatch::status(RecordStatus::Completed, "Tracking info synced: x")
			.with_shipment("Yamato", "Yamato: 1234");
		let fields = normalizer().patch_fields(&patch);
		assert_eq!(fields.len(), 4);
		assert_eq!(fields["F00000AZW"], "Yamato");
		assert_eq!(fields["F00000AZX"], "Yamato: 1234");
		assert_eq!(fields["F00000AL3"], "Completed");
	}
}
