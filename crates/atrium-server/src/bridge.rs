// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Synchronous registration bridge.
//!
//! Turns one HTTP call into one RegistrationRequest and holds the call open
//! until the reconciler consumes (deletes) it. A flow moves through
//! `Submitted -> Watching -> {Completed | Cancelled | Failed}`; the watch
//! subscription lives only as long as the flow, so dropping the handler
//! future on client disconnect releases it too.

use std::collections::BTreeMap;
use std::sync::Arc;

use atrium_common_resources::{RegistrationRequest, RegistrationRequestSpec};
use atrium_server_k8s::{ObjectKey, ObjectMeta, ResourceStore, WatchEvent};
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::ServerError;

/// Request body accepted by `POST /registrations/{id}`.
///
/// Mirrors a RegistrationRequest manifest. Identity fields in `metadata`
/// are ignored; only labels and annotations are carried over.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationPayload {
	#[serde(default)]
	pub metadata: PayloadMetadata,
	pub spec: RegistrationRequestSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadMetadata {
	#[serde(default)]
	pub labels: Option<BTreeMap<String, String>>,
	#[serde(default)]
	pub annotations: Option<BTreeMap<String, String>>,
}

/// Body encodings the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
	Json,
	Yaml,
}

impl PayloadFormat {
	/// JSON for `application/json` and `+json` types; YAML otherwise,
	/// including when no content type was sent.
	pub fn from_content_type(content_type: Option<&str>) -> Self {
		let Some(value) = content_type else {
			return PayloadFormat::Yaml;
		};
		let mime = value
			.split(';')
			.next()
			.unwrap_or_default()
			.trim()
			.to_ascii_lowercase();
		if mime == "application/json" || mime.ends_with("+json") {
			PayloadFormat::Json
		} else {
			PayloadFormat::Yaml
		}
	}
}

/// Decode a request body in the format selected by its content type.
pub fn decode_payload(
	content_type: Option<&str>,
	body: &[u8],
) -> Result<RegistrationPayload, ServerError> {
	match PayloadFormat::from_content_type(content_type) {
		PayloadFormat::Json => serde_json::from_slice(body)
			.map_err(|e| ServerError::BadRequest(format!("invalid JSON payload: {e}"))),
		PayloadFormat::Yaml => serde_yaml::from_slice(body)
			.map_err(|e| ServerError::BadRequest(format!("invalid YAML payload: {e}"))),
	}
}

/// Names must be DNS subdomains: `.`-separated labels of lowercase
/// alphanumerics and `-`, each alphanumeric at both ends, at most 253
/// characters overall.
pub fn validate_id(id: &str) -> Result<(), ServerError> {
	let valid_label = |label: &str| {
		let bytes = label.as_bytes();
		let valid_chars = bytes
			.iter()
			.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
		let valid_ends = bytes
			.first()
			.zip(bytes.last())
			.is_some_and(|(first, last)| {
				first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
			});
		valid_chars && valid_ends
	};

	if id.len() > 253 || !id.split('.').all(valid_label) {
		return Err(ServerError::BadRequest(format!(
			"registration id '{id}' is not a valid object name"
		)));
	}
	Ok(())
}

/// Where a registration flow currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
	/// The request object was created; `since` is its resourceVersion.
	Submitted { since: Option<String> },
	/// Waiting for the request to be consumed.
	Watching,
	/// The request was deleted by its reconciler.
	Completed,
	/// The server is shutting down.
	Cancelled,
	/// The watch broke or closed before completion.
	Failed(String),
}

impl FlowState {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			FlowState::Completed | FlowState::Cancelled | FlowState::Failed(_)
		)
	}

	/// Map a terminal state to the handler result.
	pub fn into_result(self) -> Result<(), ServerError> {
		match self {
			FlowState::Completed => Ok(()),
			FlowState::Cancelled => Err(ServerError::Unavailable(
				"server is shutting down".to_string(),
			)),
			FlowState::Failed(reason) => Err(ServerError::Internal(reason)),
			FlowState::Submitted { .. } | FlowState::Watching => Err(ServerError::Internal(
				"registration flow ended before reaching a terminal state".to_string(),
			)),
		}
	}
}

/// Creates RegistrationRequests and waits for them to be consumed.
pub struct RegistrationBridge<S> {
	store: Arc<S>,
	namespace: String,
	shutdown: CancellationToken,
}

impl<S: ResourceStore> RegistrationBridge<S> {
	pub fn new(store: Arc<S>, namespace: impl Into<String>, shutdown: CancellationToken) -> Self {
		Self {
			store,
			namespace: namespace.into(),
			shutdown,
		}
	}

	fn build_request(&self, id: &str, payload: RegistrationPayload) -> RegistrationRequest {
		let mut request = RegistrationRequest::new(id, payload.spec);
		request.metadata = ObjectMeta {
			name: Some(id.to_string()),
			namespace: Some(self.namespace.clone()),
			labels: payload.metadata.labels,
			annotations: payload.metadata.annotations,
			..Default::default()
		};
		request
	}

	/// Submit a registration and block until it completes or fails.
	#[instrument(skip(self, payload), fields(namespace = %self.namespace))]
	pub async fn register(&self, id: &str, payload: RegistrationPayload) -> Result<(), ServerError> {
		validate_id(id)?;
		let request = self.build_request(id, payload);
		let key = ObjectKey::namespaced(&self.namespace, id);

		let created = self.store.create(&request).await.map_err(|e| {
			if !e.is_already_exists() && !e.is_invalid() {
				warn!(key = %key, error = %e, "Failed to submit registration");
			}
			ServerError::from(e)
		})?;

		let since = created.metadata.resource_version;
		let mut state = FlowState::Submitted {
			since: since.clone(),
		};
		info!(key = %key, ?state, "Registration submitted");

		let mut events = match self.store.watch::<RegistrationRequest>(&key, since).await {
			Ok(events) => {
				state = FlowState::Watching;
				events
			}
			Err(e) => {
				state = FlowState::Failed(format!("failed to watch registration: {e}"));
				return self.finish(&key, state);
			}
		};
		debug!(key = %key, ?state, "Watching registration");

		while !state.is_terminal() {
			state = tokio::select! {
				biased;
				_ = self.shutdown.cancelled() => FlowState::Cancelled,
				next = events.next() => match next {
					Some(Ok(WatchEvent::Deleted(_))) => FlowState::Completed,
					Some(Ok(event)) => {
						if event.object().is_none() {
							trace!(key = %key, "Ignoring watch event without payload");
						}
						FlowState::Watching
					}
					Some(Err(e)) => FlowState::Failed(format!("watch failed: {e}")),
					None => FlowState::Failed("watch closed before registration completed".to_string()),
				},
			};
		}

		drop(events);
		self.finish(&key, state)
	}

	fn finish(&self, key: &ObjectKey, state: FlowState) -> Result<(), ServerError> {
		match &state {
			FlowState::Completed => info!(key = %key, "Registration completed"),
			FlowState::Cancelled => warn!(key = %key, "Registration abandoned on shutdown"),
			FlowState::Failed(reason) => warn!(key = %key, reason = %reason, "Registration failed"),
			FlowState::Submitted { .. } | FlowState::Watching => {}
		}
		state.into_result()
	}
}
