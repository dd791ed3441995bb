// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Welcome notification configuration.

use serde::Deserialize;

const DEFAULT_TEMPLATE_NAME: &str = "atrium-registration";
const DEFAULT_TEMPLATE_NAMESPACE: &str = "atrium-system";

/// Notification configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
	/// EmailTemplate name; empty disables welcome messages
	pub template_name: String,
	pub template_namespace: String,
}

impl NotificationConfig {
	pub fn enabled(&self) -> bool {
		!self.template_name.is_empty()
	}
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self {
			template_name: DEFAULT_TEMPLATE_NAME.to_string(),
			template_namespace: DEFAULT_TEMPLATE_NAMESPACE.to_string(),
		}
	}
}

/// Notification configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfigLayer {
	#[serde(default)]
	pub template_name: Option<String>,
	#[serde(default)]
	pub template_namespace: Option<String>,
}

impl NotificationConfigLayer {
	pub fn merge(&mut self, other: NotificationConfigLayer) {
		if other.template_name.is_some() {
			self.template_name = other.template_name;
		}
		if other.template_namespace.is_some() {
			self.template_namespace = other.template_namespace;
		}
	}

	pub fn finalize(self) -> NotificationConfig {
		NotificationConfig {
			template_name: self
				.template_name
				.unwrap_or_else(|| DEFAULT_TEMPLATE_NAME.to_string()),
			template_namespace: self
				.template_namespace
				.unwrap_or_else(|| DEFAULT_TEMPLATE_NAMESPACE.to_string()),
		}
	}
}
