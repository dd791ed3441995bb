// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{TenantSpec, UserSpec};

/// One-shot intent to provision a tenant with its first user.
///
/// Consumed and deleted by its reconciler once expansion succeeds. The
/// password arrives in plaintext and is replaced by a hash at admission.
#[derive(CustomResource, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "provisioning.atrium.dev",
	version = "v1",
	kind = "RegistrationRequest",
	plural = "registrationrequests",
	namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequestSpec {
	pub user: UserSpec,
	#[schemars(length(min = 8))]
	pub password: String,
	pub tenant: TenantSpec,
}

impl fmt::Debug for RegistrationRequestSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RegistrationRequestSpec")
			.field("user", &self.user)
			.field("password", &"[REDACTED]")
			.field("tenant", &self.tenant)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_debug_redacts_password() {
		let spec = RegistrationRequestSpec {
			user: UserSpec::default(),
			password: "Passw0rd!".into(),
			tenant: TenantSpec::default(),
		};
		let rendered = format!("{spec:?}");
		assert!(!rendered.contains("Passw0rd!"));
		assert!(rendered.contains("[REDACTED]"));
	}

	#[test]
	fn test_deserialize_payload() {
		let json = r#"{
			"user": {"firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.test"},
			"password": "Passw0rd!",
			"tenant": {"country": "HU", "city": "Budapest", "address": "Addr 1", "postalCode": "1000"}
		}"#;
		let spec: RegistrationRequestSpec = serde_json::from_str(json).unwrap();
		assert_eq!(spec.tenant.postal_code, "1000");
		assert_eq!(spec.tenant.company_name, None);
	}
}
