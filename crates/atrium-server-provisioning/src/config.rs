// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioner runtime configuration.

use std::time::Duration;

use crate::access::AccessPolicy;

/// Where the welcome message template lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
	pub namespace: String,
	pub name: String,
}

/// Configuration for the reconcilers and their schedulers.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
	/// Namespace RegistrationRequests are submitted to
	pub registration_namespace: String,
	/// Delay before re-checking for a tenant's scope container
	pub namespace_poll_interval: Duration,
	/// Periodic full resync for every object
	pub resync_interval: Duration,
	/// Parallel reconciles per kind
	pub concurrency: usize,
	/// First retry delay after a failed reconcile
	pub backoff_base: Duration,
	/// Retry delay ceiling
	pub backoff_max: Duration,
	/// Welcome template; `None` disables notifications
	pub template: Option<TemplateRef>,
	/// Permissions granted to every provisioned user
	pub policy: AccessPolicy,
}

impl Default for ProvisionerConfig {
	fn default() -> Self {
		Self {
			registration_namespace: "default".to_string(),
			namespace_poll_interval: Duration::from_secs(1),
			resync_interval: Duration::from_secs(300),
			concurrency: 4,
			backoff_base: Duration::from_millis(500),
			backoff_max: Duration::from_secs(300),
			template: Some(TemplateRef {
				namespace: "atrium-system".to_string(),
				name: "atrium-registration".to_string(),
			}),
			policy: AccessPolicy::standard(),
		}
	}
}
