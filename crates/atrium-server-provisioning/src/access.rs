// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access scope builder.
//!
//! Turns the policy table into a Role for one user, plus the
//! ServiceAccount and RoleBinding that give that identity the Role. The
//! output depends only on the user and the table, so re-rendering and
//! replacing the live Role drops any rule the table no longer lists.

use atrium_common_resources::{User, GROUP};
use atrium_server_k8s::{
	ObjectMeta, PolicyRule, Role, RoleBinding, RoleRef, ServiceAccount, Subject,
};
use kube::ResourceExt;

use crate::error::ProvisionerError;
use crate::reconcile::owner_ref;

/// One row of the policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
	pub api_group: String,
	pub resource: String,
	pub verbs: Vec<String>,
}

impl PolicyEntry {
	pub fn new(api_group: &str, resource: &str, verbs: &[&str]) -> Self {
		Self {
			api_group: api_group.to_string(),
			resource: resource.to_string(),
			verbs: verbs.iter().map(|v| v.to_string()).collect(),
		}
	}
}

/// Resource kind to verbs, applied to every provisioned user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
	entries: Vec<PolicyEntry>,
}

impl AccessPolicy {
	pub fn new(entries: Vec<PolicyEntry>) -> Self {
		Self { entries }
	}

	/// Order visibility, registry-token and tenant self-service.
	pub fn standard() -> Self {
		Self::new(vec![
			PolicyEntry::new(GROUP, "orders", &["get", "list", "watch"]),
			PolicyEntry::new(
				GROUP,
				"registrytokens",
				&["get", "list", "watch", "create", "update", "patch", "delete"],
			),
			PolicyEntry::new(GROUP, "tenants", &["get", "list", "watch", "update", "patch"]),
		])
	}

	pub fn entries(&self) -> &[PolicyEntry] {
		&self.entries
	}

	/// Rules for `user_name`: the table, then the self-scoped rule.
	pub fn rules_for(&self, user_name: &str) -> Vec<PolicyRule> {
		let mut rules: Vec<PolicyRule> = self
			.entries
			.iter()
			.map(|entry| PolicyRule {
				api_groups: Some(vec![entry.api_group.clone()]),
				resources: Some(vec![entry.resource.clone()]),
				verbs: entry.verbs.clone(),
				..Default::default()
			})
			.collect();
		rules.push(PolicyRule {
			api_groups: Some(vec![GROUP.to_string()]),
			resources: Some(vec!["users".to_string()]),
			resource_names: Some(vec![user_name.to_string()]),
			verbs: vec!["get".to_string(), "update".to_string(), "patch".to_string()],
			..Default::default()
		});
		rules
	}
}

impl Default for AccessPolicy {
	fn default() -> Self {
		Self::standard()
	}
}

/// Name shared by a user's Role, RoleBinding and ServiceAccount.
pub fn identity_name(user: &User) -> String {
	format!("user-{}", user.name_any())
}

fn dependent_meta(user: &User) -> Result<ObjectMeta, ProvisionerError> {
	Ok(ObjectMeta {
		name: Some(identity_name(user)),
		namespace: user.namespace(),
		owner_references: Some(vec![owner_ref(user)?]),
		..Default::default()
	})
}

pub fn build_role(user: &User, policy: &AccessPolicy) -> Result<Role, ProvisionerError> {
	Ok(Role {
		metadata: dependent_meta(user)?,
		rules: Some(policy.rules_for(&user.name_any())),
	})
}

pub fn build_service_account(user: &User) -> Result<ServiceAccount, ProvisionerError> {
	Ok(ServiceAccount {
		metadata: dependent_meta(user)?,
		..Default::default()
	})
}

pub fn build_role_binding(user: &User) -> Result<RoleBinding, ProvisionerError> {
	let name = identity_name(user);
	Ok(RoleBinding {
		metadata: dependent_meta(user)?,
		role_ref: RoleRef {
			api_group: "rbac.authorization.k8s.io".to_string(),
			kind: "Role".to_string(),
			name: name.clone(),
		},
		subjects: Some(vec![Subject {
			kind: "ServiceAccount".to_string(),
			name,
			namespace: user.namespace(),
			..Default::default()
		}]),
	})
}
