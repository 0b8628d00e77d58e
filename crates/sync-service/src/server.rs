//! HTTP server for the sync API.
//!
//! Exposes manual triggers for both passes, the ledger status summary and
//! manual retry. Passes run inline in the request task, so a request may
//! overlap a scheduled pass.

use crate::apis::sync as api;
use axum::{
	extract::{Path, State},
	response::Json,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use sync_config::ApiConfig;
use sync_core::SyncEngine;
use sync_types::{
	APIError, ReconciliationReport, RetryReport, StatusSummary, SubmissionReport,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

const BANNER: &str = "Order sync service is running.";

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<SyncEngine>,
}

/// Builds the router with every route under `/api`.
pub fn router(engine: Arc<SyncEngine>) -> Router {
	Router::new()
		.route("/", get(handle_banner))
		.nest(
			"/api",
			Router::new()
				.route("/sync", post(handle_sync))
				.route("/sync-shipment", post(handle_sync_shipment))
				.route("/status", get(handle_status))
				.route("/retry/{order_no}", post(handle_retry)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<SyncEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Sync API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn handle_banner() -> &'static str {
	BANNER
}

/// Handles POST /api/sync requests.
async fn handle_sync(State(state): State<AppState>) -> Result<Json<SubmissionReport>, APIError> {
	match api::process_submission(&state.engine).await {
		Ok(report) => Ok(Json(report)),
		Err(e) => {
			tracing::warn!("Submission request failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles POST /api/sync-shipment requests.
async fn handle_sync_shipment(
	State(state): State<AppState>,
) -> Result<Json<ReconciliationReport>, APIError> {
	match api::process_reconciliation(&state.engine).await {
		Ok(report) => Ok(Json(report)),
		Err(e) => {
			tracing::warn!("Reconciliation request failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusSummary>, APIError> {
	match api::process_status(&state.engine).await {
		Ok(summary) => Ok(Json(summary)),
		Err(e) => {
			tracing::warn!("Status request failed: {}", e);
			Err(APIError::from(e))
		},
	}
}

/// Handles POST /api/retry/{order_no} requests.
async fn handle_retry(
	Path(order_no): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<RetryReport>, APIError> {
	match api::process_retry(&order_no, &state.engine).await {
		Ok(report) => Ok(Json(report)),
		Err(e) => {
			tracing::warn!(order_no = %order_no, "Retry request failed: {}", e);
			Err(APIError::from(e))
		},
	}
}
