// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Company profile of a tenant. Owns one scope container of the same name.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "provisioning.atrium.dev",
	version = "v1",
	kind = "Tenant",
	plural = "tenants",
	status = "TenantStatus",
	shortname = "tn"
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	#[schemars(length(max = 250))]
	pub company_name: Option<String>,
	#[schemars(length(min = 1, max = 3))]
	pub country: String,
	#[schemars(length(min = 1, max = 50))]
	pub city: String,
	#[schemars(length(min = 1, max = 512))]
	pub address: String,
	#[schemars(length(min = 1, max = 30))]
	pub postal_code: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	#[schemars(length(max = 256))]
	pub tax_number: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
	#[serde(default)]
	pub last_generation: i64,
}

impl Tenant {
	/// Generation the reconciler last converged, zero if never.
	pub fn last_generation(&self) -> i64 {
		self.status.as_ref().map_or(0, |s| s.last_generation)
	}
}
