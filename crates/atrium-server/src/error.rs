// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP-facing error type.

use atrium_server_k8s::K8sError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// JSON error body returned by every failing handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("service unavailable: {0}")]
	Unavailable(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl ServerError {
	pub fn status(&self) -> StatusCode {
		match self {
			ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ServerError::Conflict(_) => StatusCode::CONFLICT,
			ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
			ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn code(&self) -> &'static str {
		match self {
			ServerError::BadRequest(_) => "bad_request",
			ServerError::Conflict(_) => "conflict",
			ServerError::Unavailable(_) => "unavailable",
			ServerError::Internal(_) => "internal_error",
		}
	}
}

impl From<K8sError> for ServerError {
	fn from(e: K8sError) -> Self {
		match e {
			K8sError::AlreadyExists { .. } => ServerError::Conflict(e.to_string()),
			K8sError::Invalid { message } => ServerError::BadRequest(message),
			other => ServerError::Internal(other.to_string()),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(error = %self, "Request failed");
		}
		let body = ErrorResponse {
			error: self.code().to_string(),
			message: match &self {
				ServerError::BadRequest(m)
				| ServerError::Conflict(m)
				| ServerError::Unavailable(m)
				| ServerError::Internal(m) => m.clone(),
			},
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_store_errors_map_to_status() {
		let exists = ServerError::from(K8sError::AlreadyExists {
			kind: "RegistrationRequest".into(),
			name: "ada".into(),
		});
		assert_eq!(exists.status(), StatusCode::CONFLICT);

		let invalid = ServerError::from(K8sError::Invalid {
			message: "password too short".into(),
		});
		assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
		assert_eq!(invalid.to_string(), "bad request: password too short");

		let api = ServerError::from(K8sError::ApiError {
			message: "connection refused".into(),
		});
		assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn test_response_status() {
		let response = ServerError::Unavailable("shutting down".into()).into_response();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}
}
