// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioner error types.

use crate::credential::CredentialError;
use crate::notify::RenderError;

/// Errors that abort a single reconcile invocation.
///
/// None of these are fatal to the process; the scheduler retries the
/// object with backoff.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
	/// Store error other than the ones the reconcilers absorb
	#[error(transparent)]
	K8sError(#[from] atrium_server_k8s::K8sError),

	/// Object has no store-assigned uid, so dependents cannot link to it
	#[error("{kind} {name} has no uid")]
	MissingUid { kind: String, name: String },

	/// A dependent still holds a deletion guard the owner waits on
	#[error("{kind} {name} still holds deletion guard {guard}")]
	GuardStillHeld {
		kind: String,
		name: String,
		guard: String,
	},

	/// Notification template could not be rendered
	#[error("Failed to render template {template}: {source}")]
	Template {
		template: String,
		#[source]
		source: RenderError,
	},

	/// Credential could not be hashed or checked
	#[error(transparent)]
	Credential(#[from] CredentialError),
}

impl ProvisionerError {
	pub(crate) fn missing_uid(kind: &str, name: &str) -> Self {
		ProvisionerError::MissingUid {
			kind: kind.to_string(),
			name: name.to_string(),
		}
	}

	/// The reconciled object or one of its dependencies no longer exists.
	pub fn is_not_found(&self) -> bool {
		matches!(self, ProvisionerError::K8sError(e) if e.is_not_found())
	}
}
