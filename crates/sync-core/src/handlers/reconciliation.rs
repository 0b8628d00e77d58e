//! Reconciliation driver.
//!
//! Polls tracking for orders the provider has accepted and completes their
//! rows once at least one shipment leg exists.

use super::{Budget, HandlerError};
use crate::state::RecordStateMachine;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use sync_fulfillment::{FulfillmentError, FulfillmentService};
use sync_types::{
	join_distinct, ReconciliationReport, RecordStatus, RowRef, SourceRecord, TrackingInfo,
};
use tracing::instrument;

const UNKNOWN_CARRIER: &str = "Unknown";
pub const NO_ACTIVE_ORDERS: &str = "No active orders to sync status.";

/// Message written in place of a provider 404.
pub const TRACKING_NOT_FOUND_MESSAGE: &str =
	"System Error: Connection to fulfillment tracking service failed (404).";

/// Row ids per order number, in first-seen order.
#[derive(Debug, Default)]
struct ActiveOrders {
	orders: Vec<(String, Vec<RowRef>)>,
	index: HashMap<String, usize>,
}

impl ActiveOrders {
	fn push(&mut self, record: &SourceRecord) {
		match self.index.get(&record.order_no) {
			Some(&i) => self.orders[i].1.push(record.row_ref()),
			None => {
				self.index
					.insert(record.order_no.clone(), self.orders.len());
				self.orders
					.push((record.order_no.clone(), vec![record.row_ref()]));
			},
		}
	}
}

/// Turns a batch failure into the text written to the ledger.
pub fn sanitize_error(error: &FulfillmentError) -> String {
	let message = error.to_string();
	if error.http_status() == Some(404) || message.contains("404") {
		TRACKING_NOT_FOUND_MESSAGE.to_string()
	} else {
		message
	}
}

/// Carrier and tracking summaries for an order, or `None` without legs.
pub fn summarize_tracking(info: &TrackingInfo) -> Option<(String, String)> {
	if info.legs.is_empty() {
		return None;
	}
	let carrier_of = |leg: &sync_types::TrackingLeg| -> String {
		leg.carrier_name
			.clone()
			.filter(|c| !c.trim().is_empty())
			.unwrap_or_else(|| UNKNOWN_CARRIER.to_string())
	};
	let carriers: Vec<String> = info.legs.iter().map(carrier_of).collect();
	let carrier = join_distinct(carriers.iter().map(String::as_str), " / ");
	let tracking = info
		.legs
		.iter()
		.zip(&carriers)
		.map(|(leg, carrier)| format!("{}: {}", carrier, leg.tracking_number))
		.collect::<Vec<_>>()
		.join("; ");
	Some((carrier, tracking))
}

/// Pulls tracking for in-flight orders and writes it back.
pub struct ReconciliationDriver {
	fulfillment: Arc<FulfillmentService>,
	state: Arc<RecordStateMachine>,
	batch_size: usize,
}

impl ReconciliationDriver {
	pub fn new(
		fulfillment: Arc<FulfillmentService>,
		state: Arc<RecordStateMachine>,
		batch_size: usize,
	) -> Self {
		Self {
			fulfillment,
			state,
			batch_size: batch_size.max(1),
		}
	}

	/// Runs one reconciliation pass over `records`.
	///
	/// `records` is the full ledger; filtering happens here. `fetched` in
	/// the report is left for the caller.
	#[instrument(skip_all, fields(records = records.len(), limit_s = budget.limit().as_secs()))]
	pub async fn run(
		&self,
		records: &[SourceRecord],
		budget: Budget,
	) -> Result<ReconciliationReport, HandlerError> {
		let mut report = ReconciliationReport::default();
		let mut active = ActiveOrders::default();

		for record in records {
			let eligible = record
				.status
				.is_some_and(|s| s.is_reconciliation_eligible());
			if eligible && !record.order_no.is_empty() {
				report.matched += 1;
				active.push(record);
			}
		}

		if active.orders.is_empty() {
			report.message = NO_ACTIVE_ORDERS.to_string();
			return Ok(report);
		}
		report.checked = active.orders.len();

		for batch in active.orders.chunks(self.batch_size) {
			if budget.is_exhausted() {
				tracing::warn!(
					elapsed_ms = budget.elapsed().as_millis() as u64,
					"Reconciliation budget spent, stopping"
				);
				report.mark_partial(budget.limit());
				break;
			}

			let order_nos: Vec<String> = batch.iter().map(|(order_no, _)| order_no.clone()).collect();
			match self.fulfillment.get_tracking(&order_nos).await {
				Ok(entries) => self.apply_tracking(batch, entries, &mut report).await?,
				Err(e) => self.fail_batch(batch, &e, &mut report).await?,
			}
		}

		report.finish();
		Ok(report)
	}

	async fn apply_tracking(
		&self,
		batch: &[(String, Vec<RowRef>)],
		entries: Vec<TrackingInfo>,
		report: &mut ReconciliationReport,
	) -> Result<(), HandlerError> {
		let rows_by_order: HashMap<&str, &[RowRef]> = batch
			.iter()
			.map(|(order_no, rows)| (order_no.as_str(), rows.as_slice()))
			.collect();
		let mut done = HashSet::new();

		for entry in entries {
			let Some(rows) = rows_by_order.get(entry.order_no.as_str()) else {
				tracing::debug!(order_no = %entry.order_no, "Ignoring tracking for unrequested order");
				continue;
			};
			let Some((carrier, tracking)) = summarize_tracking(&entry) else {
				continue;
			};
			if !done.insert(entry.order_no.clone()) {
				continue;
			}

			for row in rows.iter() {
				self.state
					.complete_with_tracking(row, &carrier, &tracking)
					.await
					.map_err(|e| HandlerError::State(e.to_string()))?;
				report.updated += 1;
			}
			tracing::info!(
				order_no = %entry.order_no,
				carrier = %carrier,
				rows = rows.len(),
				"Tracking synced"
			);
		}
		Ok(())
	}

	async fn fail_batch(
		&self,
		batch: &[(String, Vec<RowRef>)],
		error: &FulfillmentError,
		report: &mut ReconciliationReport,
	) -> Result<(), HandlerError> {
		let message = sanitize_error(error);
		tracing::error!(orders = batch.len(), error = %error, "Tracking batch failed");

		for (order_no, rows) in batch {
			for row in rows {
				self.state
					.transition(row, RecordStatus::Error, &message)
					.await
					.map_err(|e| HandlerError::State(e.to_string()))?;
				report.failed += 1;
				report.errors.push(format!("{}: {}", order_no, message));
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::time::Duration;
	use sync_config::RecordDefaults;
	use sync_fulfillment::implementations::mock::MockFulfillment;
	use sync_fulfillment::{DuplicatePolicy, RetryPolicy};
	use sync_ledger::implementations::memory::MemoryLedger;
	use sync_ledger::{FieldMapping, LedgerService, Normalizer, RawRecord};
	use sync_types::TrackingLeg;

	fn raw(row_id: &str, order_no: &str, status: &str) -> RawRecord {
		json!({ "ObjectId": row_id, "F00000ALE": order_no, "F00000AL3": status })
			.as_object()
			.cloned()
			.unwrap()
	}

	fn leg(carrier: Option<&str>, number: &str) -> TrackingLeg {
		TrackingLeg {
			carrier_name: carrier.map(str::to_string),
			tracking_number: number.to_string(),
		}
	}

	async fn setup(
		rows: Vec<RawRecord>,
		mock: MockFulfillment,
		batch_size: usize,
	) -> (MemoryLedger, ReconciliationDriver, Vec<SourceRecord>) {
		let ledger = MemoryLedger::with_records(rows);
		let service = Arc::new(LedgerService::new(
			Box::new(ledger.clone()),
			Normalizer::new(FieldMapping::default(), RecordDefaults::default()),
			100,
		));
		let fulfillment = Arc::new(FulfillmentService::new(
			Box::new(mock),
			RetryPolicy::none(),
			DuplicatePolicy::default(),
		));
		let driver = ReconciliationDriver::new(
			fulfillment,
			Arc::new(RecordStateMachine::new(service.clone())),
			batch_size,
		);
		let records = service.fetch_records().await.unwrap().records;
		(ledger, driver, records)
	}

	async fn run(
		rows: Vec<RawRecord>,
		mock: MockFulfillment,
		batch_size: usize,
		budget: Duration,
	) -> (MemoryLedger, ReconciliationReport) {
		let (ledger, driver, records) = setup(rows, mock, batch_size).await;
		let report = driver.run(&records, Budget::start(budget)).await.unwrap();
		(ledger, report)
	}

	#[test]
	fn test_summaries_dedupe_carriers() {
		let info = TrackingInfo {
			order_no: "A".into(),
			legs: vec![
				leg(Some("Yamato"), "111"),
				leg(None, "222"),
				leg(Some("Yamato"), "333"),
			],
		};
		let (carrier, tracking) = summarize_tracking(&info).unwrap();
		assert_eq!(carrier, "Yamato / Unknown");
		assert_eq!(tracking, "Yamato: 111; Unknown: 222; Yamato: 333");

		let empty = TrackingInfo {
			order_no: "B".into(),
			legs: vec![],
		};
		assert!(summarize_tracking(&empty).is_none());
	}

	#[test]
	fn test_sanitize_404() {
		let not_found = FulfillmentError::Api {
			status: Some(404),
			code: None,
			message: "HTTP 404: Not Found".into(),
		};
		assert_eq!(sanitize_error(&not_found), TRACKING_NOT_FOUND_MESSAGE);

		let other = FulfillmentError::Api {
			status: None,
			code: Some("E1".into()),
			message: "Bad request".into(),
		};
		assert_eq!(sanitize_error(&other), "Bad request (Code: E1)");
	}

	#[tokio::test]
	async fn test_completes_orders_with_legs_only() {
		let mock = MockFulfillment::new()
			.with_tracking("A", vec![leg(Some("Sagawa"), "555")])
			.with_tracking("B", vec![]);
		let (ledger, report) = run(
			vec![
				raw("r1", "A", "Processed"),
				raw("r2", "A", "Paid"),
				raw("r3", "B", "Processed"),
				raw("r4", "C", "Pending"),
			],
			mock,
			20,
			Duration::from_secs(40),
		)
		.await;

		assert_eq!(report.matched, 3);
		assert_eq!(report.checked, 2);
		assert_eq!(report.updated, 2);
		assert_eq!(report.message, "Checked 2 orders, updated 2 records, 0 failed.");

		let r1 = ledger.record("r1").await.unwrap();
		assert_eq!(r1["F00000AL3"], "Completed");
		assert_eq!(r1["F00000AZW"], "Sagawa");
		assert_eq!(r1["F00000AZX"], "Sagawa: 555");
		assert_eq!(ledger.record("r3").await.unwrap()["F00000AL3"], "Processed");
		assert_eq!(ledger.record("r4").await.unwrap()["F00000AL3"], "Pending");
	}

	#[tokio::test]
	async fn test_batches_respect_size() {
		let mock = MockFulfillment::new();
		let rows = (0..5)
			.map(|i| raw(&format!("r{i}"), &format!("O{i}"), "Processed"))
			.collect();
		let (_, report) = run(rows, mock.clone(), 2, Duration::from_secs(40)).await;

		assert_eq!(report.checked, 5);
		let sizes: Vec<usize> = mock.tracking_queries().iter().map(Vec::len).collect();
		assert_eq!(sizes, vec![2, 2, 1]);
	}

	#[tokio::test]
	async fn test_failed_batch_marks_rows_error() {
		let mock = MockFulfillment::new().with_tracking_failure(FulfillmentError::Api {
			status: Some(404),
			code: None,
			message: "HTTP 404: Not Found".into(),
		});
		let (ledger, report) = run(
			vec![raw("r1", "A", "Processed"), raw("r2", "A", "Unpaid")],
			mock,
			20,
			Duration::from_secs(40),
		)
		.await;

		assert_eq!(report.failed, 2);
		assert_eq!(report.errors.len(), 2);
		assert_eq!(report.errors[0], format!("A: {}", TRACKING_NOT_FOUND_MESSAGE));
		let r2 = ledger.record("r2").await.unwrap();
		assert_eq!(r2["F00000AL3"], "Error");
		assert_eq!(r2["F00000ALP"], TRACKING_NOT_FOUND_MESSAGE);
	}

	#[tokio::test]
	async fn test_no_active_orders() {
		let (_, report) = run(
			vec![raw("r1", "A", "Pending")],
			MockFulfillment::new(),
			20,
			Duration::from_secs(40),
		)
		.await;
		assert_eq!(report.message, NO_ACTIVE_ORDERS);
		assert_eq!(report.checked, 0);
	}

	#[tokio::test]
	async fn test_zero_budget_processes_no_batches() {
		let mock = MockFulfillment::new().with_tracking("A", vec![leg(None, "1")]);
		let (ledger, report) = run(
			vec![raw("r1", "A", "Processed")],
			mock.clone(),
			20,
			Duration::ZERO,
		)
		.await;

		assert!(report.partial);
		assert_eq!(report.message, "Partial execution. Stopped at 0s limit.");
		assert_eq!(report.updated, 0);
		assert!(mock.tracking_queries().is_empty());
		assert!(ledger.patches().await.is_empty());
	}

	#[tokio::test]
	async fn test_leg_without_number_still_completes() {
		let mock = MockFulfillment::new().with_tracking("A", vec![leg(Some("Sagawa"), "")]);
		let (ledger, report) = run(
			vec![raw("r1", "A", "Processed")],
			mock,
			20,
			Duration::from_secs(40),
		)
		.await;

		assert_eq!(report.updated, 1);
		let r1 = ledger.record("r1").await.unwrap();
		assert_eq!(r1["F00000AL3"], "Completed");
		assert_eq!(r1["F00000AZW"], "Sagawa");
	}

	#[tokio::test]
	async fn test_completed_rows_are_not_queried() {
		let mock = MockFulfillment::new().with_tracking("A", vec![leg(Some("Yamato"), "111")]);
		let (ledger, report) = run(
			vec![raw("r1", "A", "Completed")],
			mock.clone(),
			20,
			Duration::from_secs(40),
		)
		.await;

		assert_eq!(report.matched, 0);
		assert_eq!(report.message, NO_ACTIVE_ORDERS);
		assert!(mock.tracking_queries().is_empty());
		assert!(ledger.patches().await.is_empty());
	}

	#[tokio::test]
	async fn test_ledger_write_failure_on_tracking_aborts_pass() {
		let mock = MockFulfillment::new().with_tracking("A", vec![leg(Some("Yamato"), "111")]);
		let (ledger, driver, records) =
			setup(vec![raw("r1", "A", "Processed")], mock.clone(), 20).await;
		ledger.set_unavailable(true);

		let result = driver
			.run(&records, Budget::start(Duration::from_secs(40)))
			.await;
		assert!(matches!(result, Err(HandlerError::State(_))));
		assert_eq!(mock.tracking_queries().len(), 1);
	}

	#[tokio::test]
	async fn test_ledger_write_failure_on_failed_batch_aborts_pass() {
		let mock = MockFulfillment::new().with_tracking_failure(FulfillmentError::Api {
			status: None,
			code: None,
			message: "Tracking unavailable".into(),
		});
		let (ledger, driver, records) = setup(
			vec![raw("r1", "A", "Processed"), raw("r2", "B", "Processed")],
			mock,
			1,
		)
		.await;
		ledger.set_unavailable(true);

		let result = driver
			.run(&records, Budget::start(Duration::from_secs(40)))
			.await;
		assert!(matches!(result, Err(HandlerError::State(_))));
	}
}
