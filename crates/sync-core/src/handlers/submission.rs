//! Submission driver.
//!
//! Walks the consolidated orders in first-seen order. Each order is
//! validated, submitted and its outcome written to every row it was built
//! from before the next order starts.

use super::{Budget, HandlerError};
use crate::consolidate::OrderBook;
use crate::state::RecordStateMachine;
use crate::validate::validate_order;
use std::sync::Arc;
use sync_fulfillment::{FulfillmentService, Retryable};
use sync_types::{OrderAggregate, SubmissionOutcome, SubmissionReport};
use tracing::instrument;

pub const ALREADY_EXISTS_COMMENT: &str = "Order already existed in fulfillment.";

/// Submits orders and writes the outcome back to the ledger.
pub struct SubmissionDriver {
	fulfillment: Arc<FulfillmentService>,
	state: Arc<RecordStateMachine>,
}

impl SubmissionDriver {
	pub fn new(fulfillment: Arc<FulfillmentService>, state: Arc<RecordStateMachine>) -> Self {
		Self { fulfillment, state }
	}

	/// Runs one submission pass over `orders`.
	///
	/// A ledger write failure aborts the pass; every other failure is
	/// recorded against its order and the pass moves on.
	#[instrument(skip_all, fields(orders = orders.len(), limit_s = budget.limit().as_secs()))]
	pub async fn run(
		&self,
		orders: OrderBook,
		budget: Budget,
	) -> Result<SubmissionReport, HandlerError> {
		let mut report = SubmissionReport::default();

		for order in orders {
			if budget.is_exhausted() {
				tracing::warn!(
					elapsed_ms = budget.elapsed().as_millis() as u64,
					"Submission budget spent, stopping"
				);
				report.mark_partial(budget.limit());
				break;
			}

			let outcome = self.submit(&order).await;
			self.log_outcome(order.order_no(), &outcome);

			self.state
				.transition_all(&order.rows, outcome.target_status(), outcome.message())
				.await
				.map_err(|e| HandlerError::State(e.to_string()))?;

			report.record(order.order_no(), outcome);
		}

		report.finish();
		Ok(report)
	}

	async fn submit(&self, order: &OrderAggregate) -> SubmissionOutcome {
		let errors = validate_order(order);
		if !errors.is_empty() {
			return SubmissionOutcome::ValidationFailed {
				message: format!("Validation failed: {}", errors.join("; ")),
			};
		}

		match self.fulfillment.submit_order(order).await {
			Ok(submitted) => SubmissionOutcome::Success {
				message: format!(
					"Created in fulfillment. ID: {}",
					submitted.order_id.as_deref().unwrap_or("unknown")
				),
				order_id: submitted.order_id,
			},
			Err(e) if self.fulfillment.is_duplicate(&e) => SubmissionOutcome::AlreadyExists {
				message: ALREADY_EXISTS_COMMENT.to_string(),
			},
			Err(e) if e.is_retryable() => SubmissionOutcome::TransientError {
				message: e.to_string(),
			},
			Err(e) => SubmissionOutcome::FatalError {
				message: e.to_string(),
			},
		}
	}

	fn log_outcome(&self, order_no: &str, outcome: &SubmissionOutcome) {
		match outcome {
			SubmissionOutcome::Success { order_id, .. } => {
				tracing::info!(order_no = %order_no, order_id = ?order_id, "Order created");
			},
			SubmissionOutcome::AlreadyExists { .. } => {
				tracing::info!(order_no = %order_no, "Order already exists upstream");
			},
			SubmissionOutcome::ValidationFailed { message } => {
				tracing::warn!(order_no = %order_no, reason = %message, "Skipping invalid order");
			},
			SubmissionOutcome::TransientError { message }
			| SubmissionOutcome::FatalError { message } => {
				tracing::error!(order_no = %order_no, error = %message, "Order submission failed");
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::consolidate::consolidate;
	use serde_json::{json, Value};
	use std::time::Duration;
	use sync_config::{DuplicateConfig, RecordDefaults};
	use sync_fulfillment::implementations::mock::MockFulfillment;
	use sync_fulfillment::{DuplicatePolicy, RetryPolicy};
	use sync_ledger::implementations::memory::MemoryLedger;
	use sync_ledger::{FieldMapping, LedgerService, Normalizer, RawRecord};

	fn raw(row_id: &str, order_no: &str, qty: i64) -> RawRecord {
		json!({
			"ObjectId": row_id,
			"F00000AL3": "Pending",
			"F00000ALE": order_no,
			"F00000AL8": "Taro",
			"F00000ALC": "1-2-3 Shibuya",
			"F00000ALD": "Tokyo",
			"F00000ALB": "150-0002",
			"F00000AL5": format!("SKU-{row_id}"),
			"F00000AL6": qty,
			"F00000ALY": "1200",
		})
		.as_object()
		.cloned()
		.unwrap()
	}

	struct Harness {
		ledger: MemoryLedger,
		mock: MockFulfillment,
		service: Arc<LedgerService>,
		driver: SubmissionDriver,
	}

	fn harness(rows: Vec<RawRecord>, mock: MockFulfillment) -> Harness {
		let ledger = MemoryLedger::with_records(rows);
		let service = Arc::new(LedgerService::new(
			Box::new(ledger.clone()),
			Normalizer::new(FieldMapping::default(), RecordDefaults::default()),
			100,
		));
		let fulfillment = Arc::new(FulfillmentService::new(
			Box::new(mock.clone()),
			RetryPolicy::none(),
			DuplicatePolicy::from(&DuplicateConfig::default()),
		));
		let state = Arc::new(RecordStateMachine::new(service.clone()));
		Harness {
			ledger,
			mock,
			service,
			driver: SubmissionDriver::new(fulfillment, state),
		}
	}

	impl Harness {
		async fn orders(&self) -> OrderBook {
			let snapshot = self.service.fetch_records().await.unwrap();
			consolidate(&snapshot.records, 20)
		}

		async fn field(&self, row_id: &str, code: &str) -> Value {
			self.ledger.record(row_id).await.unwrap()[code].clone()
		}
	}

	#[tokio::test]
	async fn test_valid_order_is_processed() {
		let h = harness(vec![raw("r1", "A", 1), raw("r2", "A", 2)], MockFulfillment::new());
		let report = h
			.driver
			.run(h.orders().await, Budget::start(Duration::from_secs(25)))
			.await
			.unwrap();

		assert_eq!(report.success, 1);
		assert_eq!(report.failed, 0);
		assert_eq!(report.message, "Processed 1 successfully, 0 failed, 0 skipped (validation).");
		assert_eq!(h.mock.submitted(), vec!["A".to_string()]);
		for row in ["r1", "r2"] {
			assert_eq!(h.field(row, "F00000AL3").await, "Processed");
			assert_eq!(h.field(row, "F00000ALP").await, "Created in fulfillment. ID: MOCK-1");
		}
	}

	#[tokio::test]
	async fn test_invalid_order_is_skipped_and_marked_error() {
		let h = harness(vec![raw("r1", "B", 0)], MockFulfillment::new());
		let report = h
			.driver
			.run(h.orders().await, Budget::start(Duration::from_secs(25)))
			.await
			.unwrap();

		assert_eq!(report.success, 0);
		assert_eq!(report.skipped, 1);
		assert!(report.errors[0].starts_with("B: Validation failed: "));
		assert!(report.errors[0].contains("qty must be > 0"));
		assert!(h.mock.submitted().is_empty());
		assert_eq!(h.field("r1", "F00000AL3").await, "Error");
	}

	#[tokio::test]
	async fn test_duplicate_counts_as_success() {
		let h = harness(vec![raw("r1", "C", 1)], MockFulfillment::new().with_existing("C"));
		let report = h
			.driver
			.run(h.orders().await, Budget::start(Duration::from_secs(25)))
			.await
			.unwrap();

		assert_eq!(report.success, 1);
		assert!(report.errors.is_empty());
		assert_eq!(h.field("r1", "F00000AL3").await, "Processed");
		assert_eq!(h.field("r1", "F00000ALP").await, ALREADY_EXISTS_COMMENT);
	}

	#[tokio::test]
	async fn test_rejection_marks_error_and_continues() {
		let h = harness(
			vec![raw("r1", "D", 1), raw("r2", "E", 1)],
			MockFulfillment::new().with_rejected("D", "Invalid address"),
		);
		let report = h
			.driver
			.run(h.orders().await, Budget::start(Duration::from_secs(25)))
			.await
			.unwrap();

		assert_eq!(report.failed, 1);
		assert_eq!(report.success, 1);
		assert_eq!(report.errors, vec!["D: Invalid address (Code: INVALID_ORDER)".to_string()]);
		assert_eq!(h.field("r1", "F00000AL3").await, "Error");
		assert_eq!(h.field("r2", "F00000AL3").await, "Processed");
	}

	#[tokio::test]
	async fn test_zero_budget_processes_nothing() {
		let h = harness(vec![raw("r1", "A", 1)], MockFulfillment::new());
		let report = h
			.driver
			.run(h.orders().await, Budget::start(Duration::ZERO))
			.await
			.unwrap();

		assert!(report.partial);
		assert_eq!(report.message, "Partial execution. Stopped at 0s limit.");
		assert_eq!(report.success + report.failed + report.skipped, 0);
		assert!(h.ledger.patches().await.is_empty());
	}

	#[tokio::test]
	async fn test_ledger_write_failure_aborts_pass() {
		let h = harness(vec![raw("r1", "A", 1)], MockFulfillment::new());
		let orders = h.orders().await;
		h.ledger.set_unavailable(true);

		let result = h
			.driver
			.run(orders, Budget::start(Duration::from_secs(25)))
			.await;
		assert!(matches!(result, Err(HandlerError::State(_))));
	}
}
