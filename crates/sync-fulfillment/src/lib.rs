//! Fulfillment provider access for the order sync system.
//!
//! Providers implement [`FulfillmentInterface`]: a single attempt per call,
//! with failures classified into [`FulfillmentError`]. [`FulfillmentService`]
//! adds the retry policy on top and decides which failures mean "this order
//! already exists".

use async_trait::async_trait;
use sync_config::{DuplicateConfig, FulfillmentConfig};
use sync_types::{ConfigSchema, ImplementationRegistry, OrderAggregate, SubmittedOrder, TrackingInfo};
use thiserror::Error;

pub mod retry;

pub use retry::{RetryPolicy, Retryable};

pub mod implementations {
	pub mod giga;
	pub mod mock;
}

/// Errors returned by fulfillment providers.
#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
	/// The request never produced a response.
	#[error("Network error: {0}")]
	Network(String),
	/// Rate limited (429) or server side failure (5xx).
	#[error("Provider unavailable (HTTP {status}): {message}")]
	Unavailable { status: u16, message: String },
	/// A structured rejection from the provider.
	#[error("{message}{}", .code.as_ref().map(|c| format!(" (Code: {c})")).unwrap_or_default())]
	Api {
		/// HTTP status when the rejection came with a non-2xx response.
		status: Option<u16>,
		code: Option<String>,
		message: String,
	},
	/// A 2xx response that could not be read.
	#[error("Invalid provider response: {0}")]
	InvalidResponse(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl FulfillmentError {
	/// HTTP status carried by the error, if any.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			FulfillmentError::Unavailable { status, .. } => Some(*status),
			FulfillmentError::Api { status, .. } => *status,
			_ => None,
		}
	}
}

impl Retryable for FulfillmentError {
	fn is_retryable(&self) -> bool {
		matches!(
			self,
			FulfillmentError::Network(_)
				| FulfillmentError::Unavailable { .. }
				| FulfillmentError::InvalidResponse(_)
		)
	}
}

/// Interface every fulfillment provider implements.
///
/// Implementations make exactly one attempt per call; retrying is the
/// service's job.
#[async_trait]
pub trait FulfillmentInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates the order at the provider.
	async fn submit_order(&self, order: &OrderAggregate) -> Result<SubmittedOrder, FulfillmentError>;

	/// Looks up tracking for a batch of order numbers. Orders the provider
	/// does not know are simply absent from the result.
	async fn get_tracking(&self, order_nos: &[String]) -> Result<Vec<TrackingInfo>, FulfillmentError>;
}

/// Factory signature for fulfillment providers.
pub type FulfillmentFactory =
	fn(&toml::Value) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError>;

/// Registry trait for fulfillment implementations.
pub trait FulfillmentRegistry: ImplementationRegistry<Factory = FulfillmentFactory> {}

/// Returns every built-in fulfillment provider as (name, factory).
pub fn get_all_implementations() -> Vec<(&'static str, FulfillmentFactory)> {
	use implementations::{giga, mock};

	vec![
		(giga::Registry::NAME, giga::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}

/// Decides whether a rejection means the order already exists.
///
/// Provider codes are checked first. Message markers are a fallback for
/// providers that only say so in prose.
#[derive(Debug, Clone, Default)]
pub struct DuplicatePolicy {
	codes: Vec<String>,
	markers: Vec<String>,
}

impl DuplicatePolicy {
	pub fn new(codes: Vec<String>, markers: Vec<String>) -> Self {
		Self {
			codes,
			markers: markers.into_iter().map(|m| m.to_lowercase()).collect(),
		}
	}

	pub fn matches(&self, error: &FulfillmentError) -> bool {
		let FulfillmentError::Api { code, message, .. } = error else {
			return false;
		};
		if let Some(code) = code {
			if self.codes.iter().any(|c| c == code) {
				return true;
			}
		}
		let message = message.to_lowercase();
		self.markers
			.iter()
			.any(|marker| !marker.is_empty() && message.contains(marker.as_str()))
	}
}

impl From<&DuplicateConfig> for DuplicatePolicy {
	fn from(config: &DuplicateConfig) -> Self {
		Self::new(config.codes.clone(), config.markers.clone())
	}
}

/// Retrying access to one fulfillment provider.
pub struct FulfillmentService {
	backend: Box<dyn FulfillmentInterface>,
	retry: RetryPolicy,
	duplicates: DuplicatePolicy,
}

impl FulfillmentService {
	pub fn new(
		backend: Box<dyn FulfillmentInterface>,
		retry: RetryPolicy,
		duplicates: DuplicatePolicy,
	) -> Self {
		Self {
			backend,
			retry,
			duplicates,
		}
	}

	/// Builds the service policies from configuration.
	pub fn from_config(backend: Box<dyn FulfillmentInterface>, config: &FulfillmentConfig) -> Self {
		Self::new(
			backend,
			RetryPolicy::from(&config.retry),
			DuplicatePolicy::from(&config.duplicates),
		)
	}

	pub async fn submit_order(&self, order: &OrderAggregate) -> Result<SubmittedOrder, FulfillmentError> {
		self.retry
			.execute("submit_order", || self.backend.submit_order(order))
			.await
	}

	pub async fn get_tracking(&self, order_nos: &[String]) -> Result<Vec<TrackingInfo>, FulfillmentError> {
		self.retry
			.execute("get_tracking", || self.backend.get_tracking(order_nos))
			.await
	}

	pub fn is_duplicate(&self, error: &FulfillmentError) -> bool {
		self.duplicates.matches(error)
	}
}
