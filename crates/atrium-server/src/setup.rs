// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping from server configuration to provisioner configuration.

use atrium_server_config::ServerConfig;
use atrium_server_provisioning::{AccessPolicy, ProvisionerConfig, TemplateRef};

pub fn provisioner_config(config: &ServerConfig) -> ProvisionerConfig {
	let template = config.notification.enabled().then(|| TemplateRef {
		namespace: config.notification.template_namespace.clone(),
		name: config.notification.template_name.clone(),
	});

	ProvisionerConfig {
		registration_namespace: config.store.registration_namespace.clone(),
		namespace_poll_interval: config.controller.namespace_poll_interval(),
		resync_interval: config.controller.resync_interval(),
		concurrency: config.controller.concurrency,
		backoff_base: config.controller.backoff_base(),
		backoff_max: config.controller.backoff_max(),
		template,
		policy: AccessPolicy::standard(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn test_defaults_carry_over() {
		let config = provisioner_config(&ServerConfig::default());
		assert_eq!(config.registration_namespace, "default");
		assert_eq!(config.namespace_poll_interval, Duration::from_secs(1));
		assert_eq!(config.concurrency, 4);
		assert_eq!(
			config.template,
			Some(TemplateRef {
				namespace: "atrium-system".into(),
				name: "atrium-registration".into(),
			})
		);
	}

	#[test]
	fn test_empty_template_name_disables_notifications() {
		let mut server = ServerConfig::default();
		server.notification.template_name = String::new();
		assert!(provisioner_config(&server).template.is_none());
	}
}
