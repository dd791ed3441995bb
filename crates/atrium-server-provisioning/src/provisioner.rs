// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use atrium_server_k8s::ResourceStore;

use crate::config::ProvisionerConfig;
use crate::registration::RegistrationReconciler;
use crate::tenant::TenantReconciler;
use crate::user::UserReconciler;

/// The three reconcilers sharing one store.
pub struct Provisioner<S> {
	pub registrations: RegistrationReconciler<S>,
	pub tenants: TenantReconciler<S>,
	pub users: UserReconciler<S>,
	store: Arc<S>,
	config: ProvisionerConfig,
}

impl<S: ResourceStore> Provisioner<S> {
	pub fn new(store: Arc<S>, config: ProvisionerConfig) -> Self {
		Self {
			registrations: RegistrationReconciler::new(
				Arc::clone(&store),
				config.namespace_poll_interval,
				config.template.clone(),
			),
			tenants: TenantReconciler::new(Arc::clone(&store)),
			users: UserReconciler::new(Arc::clone(&store), config.policy.clone()),
			store,
			config,
		}
	}

	pub fn store(&self) -> &Arc<S> {
		&self.store
	}

	pub fn config(&self) -> &ProvisionerConfig {
		&self.config
	}
}
