//! GIGA B2B dropship API.
//!
//! Every request is a signed JSON POST. The signature is
//! `base64(hex(HMAC-SHA256(key, message)))` where
//! `message = clientId&apiPath&timestamp&nonce` and
//! `key = clientId&clientSecret&nonce`.

use crate::{FulfillmentError, FulfillmentInterface};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use sync_types::{
	http_url, non_empty_string, truncate_chars, ConfigSchema, Field, FieldType,
	ImplementationRegistry, OrderAggregate, Schema, SecretString, SubmittedOrder, TrackingInfo,
	TrackingLeg, ValidationError,
};

pub const CREATE_ORDER_PATH: &str = "/b2b-overseas-api/v1/buyer/order/dropShip-sync/v1";
pub const TRACKING_PATH: &str = "/b2b-overseas-api/v1/buyer/order/track-no/v1";

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const BODY_EXCERPT_CHARS: usize = 500;
const ORDER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type HmacSha256 = Hmac<Sha256>;

/// Values filled into the order payload when the ledger left them blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDefaults {
	pub currency: String,
	pub country: String,
	pub sales_channel: String,
	pub ship_from: String,
}

impl Default for PayloadDefaults {
	fn default() -> Self {
		Self {
			currency: "JPY".into(),
			country: "JP".into(),
			sales_channel: "Mercari".into(),
			ship_from: "Mercari Lifestyle".into(),
		}
	}
}

/// Computes the request signature.
pub fn sign(
	client_id: &str,
	client_secret: &str,
	api_path: &str,
	timestamp: &str,
	nonce: &str,
) -> Result<String, FulfillmentError> {
	let message = format!("{client_id}&{api_path}&{timestamp}&{nonce}");
	let key = format!("{client_id}&{client_secret}&{nonce}");

	let mut mac = HmacSha256::new_from_slice(key.as_bytes())
		.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;
	mac.update(message.as_bytes());
	let digest = hex::encode(mac.finalize().into_bytes());
	Ok(STANDARD.encode(digest))
}

/// Ten random decimal digits.
fn generate_nonce() -> String {
	format!("{:010}", uuid::Uuid::new_v4().as_u128() % 10_000_000_000)
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
	if value.trim().is_empty() {
		default
	} else {
		value
	}
}

fn price_value(price: Decimal) -> Value {
	if price.is_zero() {
		return Value::Null;
	}
	price.to_f64().map(|p| json!(p)).unwrap_or(Value::Null)
}

/// Turns a raw HTTP response into the `data` body or a classified error.
fn interpret_response(status: u16, reason: Option<&str>, body: &str) -> Result<Value, FulfillmentError> {
	let ok = (200..300).contains(&status);
	let throttled = status == 429 || status >= 500;
	let fallback = || reason.unwrap_or("Unknown error").to_string();

	let Ok(json) = serde_json::from_str::<Value>(body) else {
		let excerpt = truncate_chars(body, BODY_EXCERPT_CHARS).to_string();
		return Err(if throttled {
			FulfillmentError::Unavailable {
				status,
				message: fallback(),
			}
		} else if ok {
			FulfillmentError::InvalidResponse(excerpt)
		} else {
			FulfillmentError::Api {
				status: Some(status),
				code: None,
				message: format!("HTTP {status}: {}", fallback()),
			}
		});
	};

	let declined = json.get("success") == Some(&Value::Bool(false));
	if ok && !declined {
		return Ok(json);
	}

	let message = ["subMsg", "msg"]
		.iter()
		.find_map(|key| json.get(*key).and_then(Value::as_str).filter(|m| !m.is_empty()))
		.map(str::to_string)
		.unwrap_or_else(fallback);

	if throttled {
		return Err(FulfillmentError::Unavailable { status, message });
	}

	let code = match json.get("code") {
		Some(Value::String(code)) => Some(code.clone()),
		Some(Value::Number(code)) => Some(code.to_string()),
		_ => None,
	};
	let message = if ok || code.is_some() {
		message
	} else {
		format!("HTTP {status}: {message}")
	};
	Err(FulfillmentError::Api {
		status: (!ok).then_some(status),
		code,
		message,
	})
}

fn parse_tracking(body: &Value) -> Vec<TrackingInfo> {
	let Some(entries) = body.get("data").and_then(Value::as_array) else {
		return Vec::new();
	};

	entries
		.iter()
		.filter_map(|entry| {
			let order_no = entry.get("orderNo").and_then(Value::as_str)?.to_string();
			let legs = entry
				.get("shipTrackInfo")
				.and_then(Value::as_array)
				.map(|legs| {
					legs.iter()
						.map(|leg| {
							let tracking_number = match leg.get("trackingNum") {
								Some(Value::String(s)) => s.trim().to_string(),
								Some(Value::Number(n)) => n.to_string(),
								_ => String::new(),
							};
							let carrier_name = leg
								.get("carrierName")
								.and_then(Value::as_str)
								.map(str::trim)
								.filter(|c| !c.is_empty())
								.map(str::to_string);
							TrackingLeg {
								carrier_name,
								tracking_number,
							}
						})
						.collect()
				})
				.unwrap_or_default();
			Some(TrackingInfo { order_no, legs })
		})
		.collect()
}

/// GIGA fulfillment provider.
pub struct GigaFulfillment {
	client: reqwest::Client,
	base_url: String,
	client_id: String,
	client_secret: SecretString,
	defaults: PayloadDefaults,
}

impl GigaFulfillment {
	pub fn new(
		base_url: &str,
		client_id: impl Into<String>,
		client_secret: SecretString,
		defaults: PayloadDefaults,
		timeout: Duration,
	) -> Result<Self, FulfillmentError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.trim().trim_end_matches('/').to_string(),
			client_id: client_id.into(),
			client_secret,
			defaults,
		})
	}

	/// Builds the create-order body for one consolidated order.
	pub fn order_payload(&self, order: &OrderAggregate, now: DateTime<Utc>) -> Value {
		let header = &order.header;
		let defaults = &self.defaults;

		let order_lines: Vec<Value> = order
			.lines
			.iter()
			.map(|line| {
				json!({
					"sku": line.sku,
					"qty": line.qty,
					"orderDetailNo": line.line_no,
					"itemPrice": price_value(line.item_price),
					"currency": defaults.currency,
				})
			})
			.collect();

		let order_date = header
			.order_date
			.clone()
			.filter(|d| !d.trim().is_empty())
			.unwrap_or_else(|| now.format(ORDER_DATE_FORMAT).to_string());

		json!({
			"orderNo": header.order_no,
			"orderDate": order_date,
			"shipName": header.ship_name,
			"shipPhone": header.ship_phone,
			"shipAddress1": header.ship_address1,
			"shipCity": header.ship_city,
			"shipState": header.ship_state,
			"shipCountry": or_default(&header.ship_country, &defaults.country),
			"shipZipCode": header.ship_zip_code,
			"salesChannel": or_default(&header.sales_channel, &defaults.sales_channel),
			"shipFrom": or_default(&header.ship_from, &defaults.ship_from),
			"orderLines": order_lines,
			"hasOtherLabel": "false",
		})
	}

	/// One signed POST. No retries here.
	async fn post(&self, api_path: &str, body: &Value) -> Result<Value, FulfillmentError> {
		let timestamp = Utc::now().timestamp_millis().to_string();
		let nonce = generate_nonce();
		let signature = self
			.client_secret
			.with_exposed(|secret| sign(&self.client_id, secret, api_path, &timestamp, &nonce))?;

		let response = self
			.client
			.post(format!("{}{}", self.base_url, api_path))
			.header("client-id", &self.client_id)
			.header("timestamp", &timestamp)
			.header("nonce", &nonce)
			.header("sign", signature)
			.json(body)
			.send()
			.await
			.map_err(|e| FulfillmentError::Network(e.to_string()))?;

		let status = response.status();
		let text = response
			.text()
			.await
			.map_err(|e| FulfillmentError::Network(e.to_string()))?;

		interpret_response(status.as_u16(), status.canonical_reason(), &text)
	}
}

#[async_trait]
impl FulfillmentInterface for GigaFulfillment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(GigaFulfillmentSchema)
	}

	async fn submit_order(&self, order: &OrderAggregate) -> Result<SubmittedOrder, FulfillmentError> {
		let payload = self.order_payload(order, Utc::now());
		let body = self.post(CREATE_ORDER_PATH, &payload).await?;

		let order_id = match body.pointer("/data/orderId") {
			Some(Value::String(id)) => Some(id.clone()),
			Some(Value::Number(id)) => Some(id.to_string()),
			_ => None,
		};
		Ok(SubmittedOrder { order_id })
	}

	async fn get_tracking(&self, order_nos: &[String]) -> Result<Vec<TrackingInfo>, FulfillmentError> {
		if order_nos.is_empty() {
			return Ok(Vec::new());
		}
		let body = self.post(TRACKING_PATH, &json!({ "orderNo": order_nos })).await?;
		Ok(parse_tracking(&body))
	}
}

/// Configuration schema for the GIGA provider.
pub struct GigaFulfillmentSchema;

impl ConfigSchema for GigaFulfillmentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("base_url", FieldType::String).with_validator(http_url),
				Field::new("client_id", FieldType::String).with_validator(non_empty_string),
				Field::new("client_secret", FieldType::String).with_validator(non_empty_string),
			],
			vec![
				Field::new("currency", FieldType::String).with_validator(non_empty_string),
				Field::new("default_country", FieldType::String),
				Field::new("default_sales_channel", FieldType::String),
				Field::new("default_ship_from", FieldType::String),
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

/// Registry for the GIGA provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "giga";
	type Factory = crate::FulfillmentFactory;

	fn factory() -> Self::Factory {
		create_fulfillment
	}
}

impl crate::FulfillmentRegistry for Registry {}

/// Builds the GIGA provider from its configuration table.
pub fn create_fulfillment(
	config: &toml::Value,
) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError> {
	GigaFulfillmentSchema
		.validate(config)
		.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;

	let text = |key: &str| config.get(key).and_then(|v| v.as_str()).map(str::to_string);
	let mut defaults = PayloadDefaults::default();
	if let Some(currency) = text("currency") {
		defaults.currency = currency;
	}
	if let Some(country) = text("default_country") {
		defaults.country = country;
	}
	if let Some(channel) = text("default_sales_channel") {
		defaults.sales_channel = channel;
	}
	if let Some(ship_from) = text("default_ship_from") {
		defaults.ship_from = ship_from;
	}

	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	let provider = GigaFulfillment::new(
		&text("base_url").unwrap_or_default(),
		text("client_id").unwrap_or_default(),
		SecretString::from(text("client_secret").unwrap_or_default()),
		defaults,
		Duration::from_secs(timeout),
	)?;
	Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use httpmock::prelude::*;
	use sync_types::{LineItem, SourceRecord};

	fn provider(server: &MockServer) -> GigaFulfillment {
		GigaFulfillment::new(
			&server.base_url(),
			"client-1",
			SecretString::from("secret-1"),
			PayloadDefaults::default(),
			Duration::from_secs(5),
		)
		.unwrap()
	}

	fn order() -> OrderAggregate {
		let mut record = SourceRecord::new("row-1", "ORD-1");
		record.ship_name = "Taro Yamada".into();
		record.ship_phone = "090".into();
		record.ship_address1 = "1-2-3 Shibuya".into();
		record.ship_city = "Shibuya".into();
		record.ship_state = "Tokyo".into();
		record.ship_zip_code = "150-0002".into();
		record.ship_from = "Warehouse A".into();

		let mut order = OrderAggregate::from_first_record(&record);
		order.lines.push(LineItem {
			sku: "SKU-1".into(),
			qty: 2,
			line_no: 1,
			item_price: Decimal::new(1500, 0),
		});
		order.lines.push(LineItem {
			sku: "SKU-2".into(),
			qty: 1,
			line_no: 2,
			item_price: Decimal::ZERO,
		});
		order
	}

	#[test]
	fn test_signature_is_base64_of_hex_digest() {
		let signature = sign("cid", "secret", CREATE_ORDER_PATH, "1700000000000", "0123456789").unwrap();
		let decoded = STANDARD.decode(&signature).unwrap();
		let hex_digest = String::from_utf8(decoded).unwrap();
		assert_eq!(hex_digest.len(), 64);
		assert!(hex_digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

		let again = sign("cid", "secret", CREATE_ORDER_PATH, "1700000000000", "0123456789").unwrap();
		assert_eq!(signature, again);
		let other_nonce = sign("cid", "secret", CREATE_ORDER_PATH, "1700000000000", "9999999999").unwrap();
		assert_ne!(signature, other_nonce);
	}

	#[test]
	fn test_nonce_is_ten_digits() {
		for _ in 0..20 {
			let nonce = generate_nonce();
			assert_eq!(nonce.len(), 10);
			assert!(nonce.chars().all(|c| c.is_ascii_digit()));
		}
	}

	#[test]
	fn test_order_payload_fills_defaults() {
		let server_less = GigaFulfillment::new(
			"https://giga.example.com/",
			"cid",
			SecretString::from("s"),
			PayloadDefaults::default(),
			Duration::from_secs(5),
		)
		.unwrap();
		let now = Utc.with_ymd_and_hms(2024, 3, 9, 4, 5, 6).unwrap();
		let payload = server_less.order_payload(&order(), now);

		assert_eq!(payload["orderNo"], "ORD-1");
		assert_eq!(payload["orderDate"], "2024-03-09 04:05:06");
		assert_eq!(payload["shipCountry"], "JP");
		assert_eq!(payload["salesChannel"], "Mercari");
		assert_eq!(payload["shipFrom"], "Warehouse A");
		assert_eq!(payload["hasOtherLabel"], "false");

		let lines = payload["orderLines"].as_array().unwrap();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0]["orderDetailNo"], 1);
		assert_eq!(lines[0]["itemPrice"], 1500.0);
		assert_eq!(lines[0]["currency"], "JPY");
		assert!(lines[1]["itemPrice"].is_null());
	}

	#[test]
	fn test_order_payload_keeps_ledger_order_date() {
		let mut order = order();
		order.header.order_date = Some("2024-01-01 10:00:00".into());
		order.header.ship_country = "US".into();
		let provider = GigaFulfillment::new(
			"https://giga.example.com",
			"cid",
			SecretString::from("s"),
			PayloadDefaults::default(),
			Duration::from_secs(5),
		)
		.unwrap();
		let payload = provider.order_payload(&order, Utc::now());
		assert_eq!(payload["orderDate"], "2024-01-01 10:00:00");
		assert_eq!(payload["shipCountry"], "US");
	}

	#[test]
	fn test_interpret_response_classification() {
		assert!(interpret_response(200, Some("OK"), r#"{"data":{}}"#).is_ok());

		let declined = interpret_response(
			200,
			Some("OK"),
			r#"{"success":false,"code":"B001","msg":"fail","subMsg":"Order already exists"}"#,
		)
		.unwrap_err();
		match declined {
			FulfillmentError::Api { status, code, message } => {
				assert_eq!(status, None);
				assert_eq!(code.as_deref(), Some("B001"));
				assert_eq!(message, "Order already exists");
			},
			other => panic!("unexpected: {other:?}"),
		}

		assert!(matches!(
			interpret_response(503, Some("Service Unavailable"), "down"),
			Err(FulfillmentError::Unavailable { status: 503, .. })
		));
		assert!(matches!(
			interpret_response(429, Some("Too Many Requests"), r#"{"msg":"slow"}"#),
			Err(FulfillmentError::Unavailable { status: 429, .. })
		));
		assert!(matches!(
			interpret_response(200, Some("OK"), "<html>"),
			Err(FulfillmentError::InvalidResponse(_))
		));

		let not_found = interpret_response(404, Some("Not Found"), "<html>").unwrap_err();
		assert_eq!(not_found.http_status(), Some(404));
		assert!(not_found.to_string().contains("404"));
	}

	#[tokio::test]
	async fn test_submit_order_signs_and_parses_id() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path(CREATE_ORDER_PATH)
					.header("client-id", "client-1")
					.header_exists("timestamp")
					.header_exists("nonce")
					.header_exists("sign")
					.json_body_partial(r#"{"orderNo":"ORD-1","hasOtherLabel":"false"}"#);
				then.status(200)
					.json_body(json!({ "success": true, "data": { "orderId": "G-42" } }));
			})
			.await;

		let submitted = provider(&server).submit_order(&order()).await.unwrap();
		mock.assert_async().await;
		assert_eq!(submitted.order_id.as_deref(), Some("G-42"));
	}

	#[tokio::test]
	async fn test_submit_order_rejection() {
		let server = MockServer::start_async().await;
		server
			.mock_async(|when, then| {
				when.method(POST).path(CREATE_ORDER_PATH);
				then.status(400)
					.json_body(json!({ "code": 40001, "msg": "Invalid sku" }));
			})
			.await;

		let err = provider(&server).submit_order(&order()).await.unwrap_err();
		assert_eq!(err.to_string(), "Invalid sku (Code: 40001)");
		assert_eq!(err.http_status(), Some(400));
	}

	#[tokio::test]
	async fn test_tracking_request_and_parsing() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path(TRACKING_PATH)
					.json_body(json!({ "orderNo": ["ORD-1", "ORD-2"] }));
				then.status(200).json_body(json!({
					"success": true,
					"data": [
						{ "orderNo": "ORD-1", "shipTrackInfo": [
							{ "carrierName": "Yamato", "trackingNum": "111" },
							{ "trackingNum": "222" },
							{ "carrierName": "Sagawa", "trackingNum": "" }
						]},
						{ "orderNo": "ORD-2", "shipTrackInfo": [] }
					]
				}));
			})
			.await;

		let tracking = provider(&server)
			.get_tracking(&["ORD-1".to_string(), "ORD-2".to_string()])
			.await
			.unwrap();
		mock.assert_async().await;

		assert_eq!(tracking.len(), 2);
		assert_eq!(tracking[0].legs.len(), 3);
		assert_eq!(tracking[0].legs[0].carrier_name.as_deref(), Some("Yamato"));
		assert_eq!(tracking[0].legs[1].carrier_name, None);
		assert_eq!(tracking[0].legs[2].tracking_number, "");
		assert!(tracking[1].legs.is_empty());
	}

	#[test]
	fn test_leg_without_tracking_number_is_kept() {
		let tracking = parse_tracking(&json!({
			"data": [
				{ "orderNo": "A", "shipTrackInfo": [{ "carrierName": "Sagawa", "trackingNum": "" }] },
				{ "orderNo": "B", "shipTrackInfo": [{ "carrierName": "Yamato" }] }
			]
		}));

		assert_eq!(tracking.len(), 2);
		assert_eq!(tracking[0].legs.len(), 1);
		assert_eq!(tracking[0].legs[0].carrier_name.as_deref(), Some("Sagawa"));
		assert_eq!(tracking[0].legs[0].tracking_number, "");
		assert_eq!(tracking[1].legs.len(), 1);
		assert_eq!(tracking[1].legs[0].tracking_number, "");
	}

	#[tokio::test]
	async fn test_empty_tracking_batch_skips_request() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path(TRACKING_PATH);
				then.status(200).json_body(json!({ "data": [] }));
			})
			.await;

		let tracking = provider(&server).get_tracking(&[]).await.unwrap();
		assert!(tracking.is_empty());
		mock.assert_hits_async(0).await;
	}

	#[test]
	fn test_factory_validates_config() {
		let missing: toml::Value = toml::from_str("base_url = \"https://giga.example.com\"").unwrap();
		assert!(matches!(
			create_fulfillment(&missing),
			Err(FulfillmentError::Configuration(_))
		));

		let valid: toml::Value = toml::from_str(
			r#"
base_url = "https://giga.example.com"
client_id = "cid"
client_secret = "secret"
currency = "USD"
"#,
		)
		.unwrap();
		assert!(create_fulfillment(&valid).is_ok());
	}
}
