//! Sync engine.
//!
//! Owns the ledger and fulfillment services and exposes the operations the
//! service layer triggers: the two passes, the status summary and manual
//! retry. Each call reads the ledger fresh; nothing is cached between
//! calls.

use crate::consolidate::consolidate;
use crate::handlers::{Budget, ReconciliationDriver, SubmissionDriver};
use crate::state::RecordStateMachine;
use std::sync::Arc;
use sync_config::Config;
use sync_fulfillment::FulfillmentService;
use sync_ledger::{LedgerService, LedgerSnapshot};
use sync_types::{
	ReconciliationReport, RecordStatus, RetryReport, StatusSummary, SubmissionReport,
};
use thiserror::Error;
use tracing::instrument;

pub const MANUAL_RETRY_COMMENT: &str = "Manual retry.";

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Ledger error: {0}")]
	Ledger(String),
	#[error("Handler error: {0}")]
	Handler(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

/// Runs sync passes against one ledger and one fulfillment provider.
pub struct SyncEngine {
	config: Config,
	ledger: Arc<LedgerService>,
	state: Arc<RecordStateMachine>,
	submission: SubmissionDriver,
	reconciliation: ReconciliationDriver,
}

impl SyncEngine {
	pub fn new(config: Config, ledger: Arc<LedgerService>, fulfillment: Arc<FulfillmentService>) -> Self {
		let state = Arc::new(RecordStateMachine::new(ledger.clone()));
		let submission = SubmissionDriver::new(fulfillment.clone(), state.clone());
		let reconciliation = ReconciliationDriver::new(
			fulfillment,
			state.clone(),
			config.sync.reconcile_batch_size,
		);

		Self {
			config,
			ledger,
			state,
			submission,
			reconciliation,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	async fn snapshot(&self) -> Result<LedgerSnapshot, EngineError> {
		self.ledger
			.fetch_records()
			.await
			.map_err(|e| EngineError::Ledger(e.to_string()))
	}

	/// Submits pending and errored orders to the fulfillment provider.
	#[instrument(skip_all, fields(sync_id = %self.config.sync.id))]
	pub async fn run_submission(&self) -> Result<SubmissionReport, EngineError> {
		let budget = Budget::start(self.config.sync.submit_deadline());
		tracing::info!("Starting submission pass");

		let snapshot = self.snapshot().await?;
		let eligible = snapshot.records.iter().filter(|r| {
			r.status.is_some_and(|s| s.is_submission_eligible()) && !r.order_no.is_empty()
		});
		let orders = consolidate(eligible, self.config.sync.max_orders_per_run);

		if !orders.excluded().is_empty() {
			tracing::info!(
				cap = self.config.sync.max_orders_per_run,
				deferred = orders.excluded().len(),
				"Order cap reached, deferring remaining orders"
			);
		}

		let mut report = if orders.is_empty() {
			SubmissionReport::nothing_to_do()
		} else {
			self.submission
				.run(orders, budget)
				.await
				.map_err(|e| EngineError::Handler(e.to_string()))?
		};
		report.rejected = snapshot.rejected.len();

		tracing::info!(
			success = report.success,
			failed = report.failed,
			skipped = report.skipped,
			partial = report.partial,
			"Submission pass finished"
		);
		Ok(report)
	}

	/// Pulls tracking for in-flight orders back into the ledger.
	#[instrument(skip_all, fields(sync_id = %self.config.sync.id))]
	pub async fn run_reconciliation(&self) -> Result<ReconciliationReport, EngineError> {
		let budget = Budget::start(self.config.sync.reconcile_deadline());
		tracing::info!("Starting reconciliation pass");

		let snapshot = self.snapshot().await?;
		let mut report = self
			.reconciliation
			.run(&snapshot.records, budget)
			.await
			.map_err(|e| EngineError::Handler(e.to_string()))?;
		report.fetched = snapshot.total;
		report.rejected = snapshot.rejected.len();

		tracing::info!(
			checked = report.checked,
			updated = report.updated,
			failed = report.failed,
			partial = report.partial,
			"Reconciliation pass finished"
		);
		Ok(report)
	}

	/// Counts rows per status.
	pub async fn status_summary(&self) -> Result<StatusSummary, EngineError> {
		let snapshot = self.snapshot().await?;
		let mut summary = StatusSummary {
			total: snapshot.total,
			..Default::default()
		};

		for record in &snapshot.records {
			match record.status {
				Some(RecordStatus::Pending) => summary.pending += 1,
				Some(RecordStatus::Processed) => summary.processed += 1,
				Some(RecordStatus::Error) => summary.error += 1,
				Some(RecordStatus::Completed) => summary.completed += 1,
				_ => {},
			}
		}
		Ok(summary)
	}

	/// Puts every row of an order back to `Pending` where the lifecycle
	/// allows it.
	#[instrument(skip_all, fields(order_no = %order_no))]
	pub async fn retry_order(&self, order_no: &str) -> Result<RetryReport, EngineError> {
		let order_no = order_no.trim();
		let snapshot = self.snapshot().await?;
		let rows: Vec<_> = snapshot
			.records
			.iter()
			.filter(|r| !order_no.is_empty() && r.order_no == order_no)
			.map(|r| r.row_ref())
			.collect();

		if rows.is_empty() {
			return Err(EngineError::OrderNotFound(order_no.to_string()));
		}

		let mut report = RetryReport {
			order_no: order_no.to_string(),
			..Default::default()
		};
		for row in &rows {
			if !RecordStateMachine::can_transition(row, RecordStatus::Pending) {
				tracing::debug!(row_id = %row.row_id, status = ?row.status, "Row cannot be retried");
				report.skipped += 1;
				continue;
			}
			self.state
				.transition(row, RecordStatus::Pending, MANUAL_RETRY_COMMENT)
				.await
				.map_err(|e| EngineError::Handler(e.to_string()))?;
			report.updated += 1;
		}

		report.message = format!(
			"Order {}: {} records reset to Pending, {} skipped.",
			order_no, report.updated, report.skipped
		);
		tracing::info!(updated = report.updated, skipped = report.skipped, "Manual retry applied");
		Ok(report)
	}
}
