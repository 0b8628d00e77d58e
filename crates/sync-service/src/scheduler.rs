//! Hourly trigger for the sync passes.
//!
//! Sleeps until the next UTC top-of-hour listed in the schedule, runs the
//! pass that hour belongs to, then waits for the following window. Passes
//! are awaited, so the scheduler never overlaps itself.

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use clap::ValueEnum;
use std::sync::Arc;
use sync_config::ScheduleConfig;
use sync_core::SyncEngine;

/// One of the two sync passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pass {
	Submit,
	Reconcile,
}

impl Pass {
	/// Runs the pass and returns its report as JSON.
	pub async fn run(self, engine: &SyncEngine) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
		let report = match self {
			Pass::Submit => serde_json::to_value(engine.run_submission().await?)?,
			Pass::Reconcile => serde_json::to_value(engine.run_reconciliation().await?)?,
		};
		Ok(report)
	}
}

/// Returns the first top-of-hour strictly after `now` that has a pass
/// scheduled, or `None` when no hour is configured.
pub fn next_run(schedule: &ScheduleConfig, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Pass)> {
	let hour_start = now.duration_trunc(Duration::hours(1)).ok()?;

	(0..=24).find_map(|offset| {
		let candidate = hour_start + Duration::hours(offset);
		if candidate <= now {
			return None;
		}
		let hour = candidate.hour();
		if schedule.submit_hours_utc.contains(&hour) {
			Some((candidate, Pass::Submit))
		} else if schedule.reconcile_hours_utc.contains(&hour) {
			Some((candidate, Pass::Reconcile))
		} else {
			None
		}
	})
}

/// Runs scheduled passes forever. Returns only when nothing is scheduled.
pub async fn run_scheduler(schedule: ScheduleConfig, engine: Arc<SyncEngine>) {
	tracing::info!(
		submit_hours = ?schedule.submit_hours_utc,
		reconcile_hours = ?schedule.reconcile_hours_utc,
		"Scheduler started"
	);

	loop {
		let now = Utc::now();
		let Some((at, pass)) = next_run(&schedule, now) else {
			tracing::warn!("No scheduled hours configured, scheduler stopping");
			return;
		};
		tracing::info!(pass = ?pass, at = %at, "Next scheduled pass");

		let wait = (at - now).to_std().unwrap_or_default();
		tokio::time::sleep(wait).await;

		match pass.run(&engine).await {
			Ok(report) => tracing::info!(pass = ?pass, report = %report, "Scheduled pass finished"),
			Err(e) => tracing::error!(pass = ?pass, error = %e, "Scheduled pass failed"),
		}
	}
}
