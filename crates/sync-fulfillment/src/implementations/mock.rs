//! Deterministic in-process fulfillment provider.
//!
//! Used for dry runs and engine tests. Pre-existing orders answer with the
//! provider's "already exists" rejection, rejected orders with a validation
//! error, and tracking comes from a canned table. Clones share state.

use crate::{FulfillmentError, FulfillmentInterface};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, OrderAggregate, Schema, SubmittedOrder,
	TrackingInfo, TrackingLeg, ValidationError,
};

#[derive(Debug, Default)]
struct MockState {
	existing: HashSet<String>,
	rejected: HashMap<String, String>,
	tracking: HashMap<String, Vec<TrackingLeg>>,
	tracking_failure: Option<FulfillmentError>,
	/// Remaining submissions that fail with a 503 before succeeding.
	transient_failures: usize,
	submit_attempts: usize,
	submitted: Vec<String>,
	tracking_queries: Vec<Vec<String>>,
	next_id: u64,
}

/// Mock fulfillment provider.
#[derive(Debug, Clone, Default)]
pub struct MockFulfillment {
	state: Arc<Mutex<MockState>>,
}

impl MockFulfillment {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// The provider already holds this order.
	pub fn with_existing(self, order_no: impl Into<String>) -> Self {
		self.state().existing.insert(order_no.into());
		self
	}

	/// Submissions of this order are rejected with `message`.
	pub fn with_rejected(self, order_no: impl Into<String>, message: impl Into<String>) -> Self {
		self.state().rejected.insert(order_no.into(), message.into());
		self
	}

	pub fn with_tracking(self, order_no: impl Into<String>, legs: Vec<TrackingLeg>) -> Self {
		self.state().tracking.insert(order_no.into(), legs);
		self
	}

	/// Every tracking query fails with `error`.
	pub fn with_tracking_failure(self, error: FulfillmentError) -> Self {
		self.state().tracking_failure = Some(error);
		self
	}

	/// The next `count` submissions fail with a retryable error.
	pub fn with_transient_failures(self, count: usize) -> Self {
		self.state().transient_failures = count;
		self
	}

	/// Order numbers created so far, in order.
	pub fn submitted(&self) -> Vec<String> {
		self.state().submitted.clone()
	}

	/// Submission calls made, including failed ones.
	pub fn submit_attempts(&self) -> usize {
		self.state().submit_attempts
	}

	/// Order-number batches passed to tracking lookups.
	pub fn tracking_queries(&self) -> Vec<Vec<String>> {
		self.state().tracking_queries.clone()
	}
}

#[async_trait]
impl FulfillmentInterface for MockFulfillment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockFulfillmentSchema)
	}

	async fn submit_order(&self, order: &OrderAggregate) -> Result<SubmittedOrder, FulfillmentError> {
		let mut state = self.state();
		state.submit_attempts += 1;
		let order_no = order.order_no().to_string();

		if state.transient_failures > 0 {
			state.transient_failures -= 1;
			return Err(FulfillmentError::Unavailable {
				status: 503,
				message: "Service Unavailable".into(),
			});
		}
		if state.existing.contains(&order_no) {
			return Err(FulfillmentError::Api {
				status: Some(400),
				code: Some("ORDER_EXISTS".into()),
				message: format!("Order {order_no} already exists"),
			});
		}
		if let Some(message) = state.rejected.get(&order_no) {
			return Err(FulfillmentError::Api {
				status: Some(400),
				code: Some("INVALID_ORDER".into()),
				message: message.clone(),
			});
		}

		state.next_id += 1;
		let order_id = format!("MOCK-{}", state.next_id);
		state.existing.insert(order_no.clone());
		state.submitted.push(order_no);
		Ok(SubmittedOrder {
			order_id: Some(order_id),
		})
	}

	async fn get_tracking(&self, order_nos: &[String]) -> Result<Vec<TrackingInfo>, FulfillmentError> {
		let mut state = self.state();
		state.tracking_queries.push(order_nos.to_vec());

		if let Some(error) = &state.tracking_failure {
			return Err(error.clone());
		}

		Ok(order_nos
			.iter()
			.filter_map(|order_no| {
				state.tracking.get(order_no).map(|legs| TrackingInfo {
					order_no: order_no.clone(),
					legs: legs.clone(),
				})
			})
			.collect())
	}
}

/// Configuration schema for the mock provider.
///
/// - `existing_orders`, `rejected_orders` (optional): arrays of order numbers
/// - `tracking_failure` (optional): message every tracking query fails with
/// - `tracking` (optional): table of order number to arrays of
///   `{ carrier, number }` legs
pub struct MockFulfillmentSchema;

impl ConfigSchema for MockFulfillmentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let leg = Schema::new(
			vec![Field::new("number", FieldType::String)],
			vec![Field::new("carrier", FieldType::String)],
		);
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("existing_orders", FieldType::Array(Box::new(FieldType::String))),
				Field::new("rejected_orders", FieldType::Array(Box::new(FieldType::String))),
				Field::new("tracking_failure", FieldType::String),
				Field::new(
					"tracking",
					FieldType::Map(Box::new(FieldType::Array(Box::new(FieldType::Table(leg))))),
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the mock provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::FulfillmentFactory;

	fn factory() -> Self::Factory {
		create_fulfillment
	}
}

impl crate::FulfillmentRegistry for Registry {}

fn strings(config: &toml::Value, key: &str) -> Vec<String> {
	config
		.get(key)
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default()
}

pub fn create_fulfillment(
	config: &toml::Value,
) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError> {
	MockFulfillmentSchema
		.validate(config)
		.map_err(|e| FulfillmentError::Configuration(e.to_string()))?;

	let mut mock = MockFulfillment::new();
	for order_no in strings(config, "existing_orders") {
		mock = mock.with_existing(order_no);
	}
	for order_no in strings(config, "rejected_orders") {
		mock = mock.with_rejected(order_no, "Order rejected by mock fulfillment");
	}
	if let Some(message) = config.get("tracking_failure").and_then(|v| v.as_str()) {
		mock = mock.with_tracking_failure(FulfillmentError::Api {
			status: None,
			code: None,
			message: message.to_string(),
		});
	}
	if let Some(tracking) = config.get("tracking").and_then(|v| v.as_table()) {
		for (order_no, legs) in tracking {
			let legs = legs
				.as_array()
				.map(|legs| {
					legs.iter()
						.filter_map(|leg| {
							Some(TrackingLeg {
								carrier_name: leg.get("carrier").and_then(|c| c.as_str()).map(str::to_string),
								tracking_number: leg.get("number")?.as_str()?.to_string(),
							})
						})
						.collect()
				})
				.unwrap_or_default();
			mock = mock.with_tracking(order_no.clone(), legs);
		}
	}
	Ok(Box::new(mock))
}
