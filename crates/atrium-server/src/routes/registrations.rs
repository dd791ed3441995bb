// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Registration submission.

use atrium_server_k8s::ResourceStore;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};

use crate::api::AppState;
use crate::bridge::decode_payload;
use crate::error::ServerError;

/// POST /registrations/{id}
///
/// Responds 201 with an empty body once the registration has been fully
/// provisioned.
pub async fn register<S: ResourceStore>(
	State(state): State<AppState<S>>,
	Path(id): Path<String>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<StatusCode, ServerError> {
	let content_type = headers
		.get(header::CONTENT_TYPE)
		.map(|v| {
			v.to_str()
				.map_err(|_| ServerError::BadRequest("content type is not valid text".to_string()))
		})
		.transpose()?;
	let payload = decode_payload(content_type, &body)?;

	state.bridge.register(&id, payload).await?;
	Ok(StatusCode::CREATED)
}
