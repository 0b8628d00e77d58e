//! Sync API implementation.
//!
//! Triggers passes, reports ledger status and applies manual retries on
//! behalf of the HTTP layer. Every call goes straight to the engine, which
//! reads the ledger fresh each time.

use sync_core::{EngineError, SyncEngine};
use sync_types::{
	APIError, ReconciliationReport, RetryReport, StatusSummary, SubmissionReport,
};
use thiserror::Error;
use tracing::info;

/// Seconds a client should wait before retrying while the ledger is down.
const LEDGER_RETRY_AFTER_SECS: u64 = 60;

/// Errors that can occur while serving a sync request.
#[derive(Debug, Error)]
pub enum SyncApiError {
	#[error("Invalid order number: {0:?}")]
	InvalidOrderNo(String),
	#[error(transparent)]
	Engine(#[from] EngineError),
}

impl From<SyncApiError> for APIError {
	fn from(err: SyncApiError) -> Self {
		let message = err.to_string();
		match err {
			SyncApiError::InvalidOrderNo(_) => APIError::BadRequest {
				error_type: "INVALID_ORDER_NO".to_string(),
				message,
			},
			SyncApiError::Engine(EngineError::OrderNotFound(_)) => APIError::NotFound {
				error_type: "ORDER_NOT_FOUND".to_string(),
				message,
			},
			SyncApiError::Engine(EngineError::Ledger(_)) => APIError::ServiceUnavailable {
				error_type: "LEDGER_UNAVAILABLE".to_string(),
				message,
				retry_after: Some(LEDGER_RETRY_AFTER_SECS),
			},
			SyncApiError::Engine(EngineError::Handler(_)) => APIError::InternalServerError {
				error_type: "SYNC_FAILED".to_string(),
				message,
			},
		}
	}
}

/// Runs one submission pass.
pub async fn process_submission(engine: &SyncEngine) -> Result<SubmissionReport, SyncApiError> {
	info!("Submission pass requested");
	Ok(engine.run_submission().await?)
}

/// Runs one reconciliation pass.
pub async fn process_reconciliation(
	engine: &SyncEngine,
) -> Result<ReconciliationReport, SyncApiError> {
	info!("Reconciliation pass requested");
	Ok(engine.run_reconciliation().await?)
}

pub async fn process_status(engine: &SyncEngine) -> Result<StatusSummary, SyncApiError> {
	Ok(engine.status_summary().await?)
}

/// Resets the errored rows of one order to `Pending`.
pub async fn process_retry(
	order_no: &str,
	engine: &SyncEngine,
) -> Result<RetryReport, SyncApiError> {
	let order_no = order_no.trim();
	if order_no.is_empty() {
		return Err(SyncApiError::InvalidOrderNo(order_no.to_string()));
	}
	info!(order_no = %order_no, "Manual retry requested");
	Ok(engine.retry_order(order_no).await?)
}
