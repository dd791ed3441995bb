// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Outbound notification. Delivery is performed by an external agent that
/// reports back through the status.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "provisioning.atrium.dev",
	version = "v1",
	kind = "Email",
	plural = "emails",
	status = "EmailStatus",
	namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EmailSpec {
	pub to_address: String,
	pub from_name: String,
	pub from_address: String,
	pub subject: String,
	pub body: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailStatus {
	#[serde(default)]
	pub last_generation: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_timestamp: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sent_timestamp: Option<String>,
}

/// Message template rendered with `{placeholder}` substitution.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
	group = "provisioning.atrium.dev",
	version = "v1",
	kind = "EmailTemplate",
	plural = "emailtemplates",
	status = "EmailTemplateStatus",
	namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplateSpec {
	pub display_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub from_name: String,
	pub from_address: String,
	pub subject: String,
	pub body: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplateStatus {
	#[serde(default)]
	pub last_generation: i64,
}
