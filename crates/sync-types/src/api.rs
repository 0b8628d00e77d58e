//! Error types for the HTTP API.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable error kind.
	pub error: String,
	pub message: String,
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds.
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// API failure with its HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// 400
	BadRequest { error_type: String, message: String },
	/// 404
	NotFound { error_type: String, message: String },
	/// 503, used when a collaborator could not be reached before the pass began.
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// 500
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			APIError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			APIError::NotFound { .. } => StatusCode::NOT_FOUND,
			APIError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			APIError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message, retry_after) = match self {
			APIError::BadRequest { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::InternalServerError { error_type, message } => (error_type, message, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, *retry_after),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
			details: None,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl IntoResponse for APIError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		let err = APIError::BadRequest {
			error_type: "INVALID_ORDER_NO".into(),
			message: "empty".into(),
		};
		assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
		assert_eq!(err.to_error_response().error, "INVALID_ORDER_NO");

		let err = APIError::ServiceUnavailable {
			error_type: "LEDGER_UNAVAILABLE".into(),
			message: "down".into(),
			retry_after: Some(60),
		};
		assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(err.to_error_response().retry_after, Some(60));
	}

	#[test]
	fn test_into_response_status() {
		let response = APIError::InternalServerError {
			error_type: "SYNC_FAILED".into(),
			message: "write failed".into(),
		}
		.into_response();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
