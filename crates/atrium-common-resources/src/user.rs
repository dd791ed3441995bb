// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{PASSWORD_ANNOTATION, TENANT_LABEL};

/// Identity of a person inside a tenant's scope container.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "provisioning.atrium.dev",
	version = "v1",
	kind = "User",
	plural = "users",
	status = "UserStatus",
	namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
	#[schemars(length(min = 1, max = 125))]
	pub first_name: String,
	#[schemars(length(min = 1, max = 125))]
	pub last_name: String,
	#[schemars(length(min = 5, max = 256))]
	pub email: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	#[schemars(length(min = 7, max = 15))]
	pub phone_number: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UserPhase {
	#[default]
	Pending,
	Validated,
}

/// Reference to an object by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectRef {
	pub name: String,
}

impl ObjectRef {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
	#[serde(default)]
	pub last_generation: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phase: Option<UserPhase>,
	/// Secret holding the materialized credential hash.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub password_ref: Option<ObjectRef>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tenant_refs: Vec<ObjectRef>,
}

impl User {
	pub fn last_generation(&self) -> i64 {
		self.status.as_ref().map_or(0, |s| s.last_generation)
	}

	/// Credential hash waiting to be materialized, if any.
	pub fn pending_credential(&self) -> Option<&str> {
		self.annotations()
			.get(PASSWORD_ANNOTATION)
			.map(String::as_str)
			.filter(|hash| !hash.is_empty())
	}

	/// Tenant this user was provisioned for.
	pub fn tenant_name(&self) -> Option<&str> {
		self.labels().get(TENANT_LABEL).map(String::as_str)
	}
}
