// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Result type alias for store operations.
pub type K8sResult<T> = Result<T, K8sError>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum K8sError {
	#[error("{kind} not found: {name}")]
	NotFound { kind: String, name: String },

	#[error("{kind} already exists: {name}")]
	AlreadyExists { kind: String, name: String },

	#[error("Conflict updating {kind} {name}: object has been modified")]
	Conflict { kind: String, name: String },

	#[error("Invalid object: {message}")]
	Invalid { message: String },

	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("Watch error: {message}")]
	Watch { message: String },

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl K8sError {
	/// The object vanished between read and use.
	pub fn is_not_found(&self) -> bool {
		matches!(self, K8sError::NotFound { .. })
	}

	/// A creation raced with another writer or a re-delivery.
	pub fn is_already_exists(&self) -> bool {
		matches!(self, K8sError::AlreadyExists { .. })
	}

	/// Optimistic-concurrency mismatch on update or patch.
	pub fn is_conflict(&self) -> bool {
		matches!(self, K8sError::Conflict { .. })
	}

	/// Business validation rejected the object.
	pub fn is_invalid(&self) -> bool {
		matches!(self, K8sError::Invalid { .. })
	}

	/// Classify a kube API error for the object it was issued against.
	pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
		match err {
			kube::Error::Api(resp) => match resp.code {
				404 => K8sError::NotFound {
					kind: kind.to_string(),
					name: name.to_string(),
				},
				409 if resp.reason == "AlreadyExists" => K8sError::AlreadyExists {
					kind: kind.to_string(),
					name: name.to_string(),
				},
				409 => K8sError::Conflict {
					kind: kind.to_string(),
					name: name.to_string(),
				},
				400 | 422 => K8sError::Invalid {
					message: resp.message,
				},
				_ => K8sError::ApiError {
					message: resp.message,
				},
			},
			other => other.into(),
		}
	}
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}
