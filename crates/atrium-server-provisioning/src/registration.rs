// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RegistrationRequest reconciler.
//!
//! Expands one request into a Tenant, a User in the Tenant's namespace
//! and an optional welcome Email, then deletes the request. The deletion
//! is what a waiting HTTP caller observes as completion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atrium_common_resources::{
	RegistrationRequest, Tenant, User, PASSWORD_ANNOTATION, TENANT_LABEL,
};
use atrium_server_k8s::{is_deleting, Namespace, ObjectKey, ResourceStore};
use kube::ResourceExt;
use tracing::instrument;

use crate::config::TemplateRef;
use crate::credential::{hash_password, is_password_hash, Plaintext};
use crate::error::ProvisionerError;
use crate::notify::send_welcome;
use crate::reconcile::{get_or_create, Outcome, Reconciler};

pub struct RegistrationReconciler<S> {
	store: Arc<S>,
	namespace_poll_interval: Duration,
	template: Option<TemplateRef>,
}

impl<S: ResourceStore> RegistrationReconciler<S> {
	pub fn new(store: Arc<S>, namespace_poll_interval: Duration, template: Option<TemplateRef>) -> Self {
		Self {
			store,
			namespace_poll_interval,
			template,
		}
	}

	fn desired_user(request: &RegistrationRequest, tenant: &str) -> Result<User, ProvisionerError> {
		// Requests that bypassed admission may still carry plaintext.
		let hash = if is_password_hash(&request.spec.password) {
			request.spec.password.clone()
		} else {
			hash_password(&Plaintext::new(request.spec.password.clone()))?
		};

		let mut user = User::new(tenant, request.spec.user.clone());
		user.metadata.namespace = Some(tenant.to_string());
		user.metadata.annotations = Some(BTreeMap::from([(PASSWORD_ANNOTATION.to_string(), hash)]));
		user.metadata.labels = Some(BTreeMap::from([(TENANT_LABEL.to_string(), tenant.to_string())]));
		Ok(user)
	}
}

#[async_trait]
impl<S: ResourceStore> Reconciler for RegistrationReconciler<S> {
	type Object = RegistrationRequest;

	#[instrument(skip(self, key), fields(registration = %key))]
	async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ProvisionerError> {
		let Some(request) = self.store.get_opt::<RegistrationRequest>(key).await? else {
			tracing::debug!("Registration already completed");
			return Ok(Outcome::Converged);
		};
		if is_deleting(&request) {
			return Ok(Outcome::Converged);
		}

		let tenant_name = request
			.uid()
			.ok_or_else(|| ProvisionerError::missing_uid("RegistrationRequest", &request.name_any()))?;

		let tenant = Tenant::new(&tenant_name, request.spec.tenant.clone());
		get_or_create(self.store.as_ref(), &tenant).await?;

		let namespace_key = ObjectKey::cluster(&tenant_name);
		match self.store.get_opt::<Namespace>(&namespace_key).await? {
			Some(namespace) if !is_deleting(&namespace) => {}
			_ => {
				tracing::info!(tenant = %tenant_name, "Waiting for tenant namespace");
				return Ok(Outcome::Requeue(self.namespace_poll_interval));
			}
		}

		let user = get_or_create(self.store.as_ref(), &Self::desired_user(&request, &tenant_name)?).await?;

		if let Some(template) = &self.template {
			send_welcome(self.store.as_ref(), template, &user).await?;
		}

		match self.store.delete::<RegistrationRequest>(key).await {
			Ok(()) => {}
			Err(e) if e.is_not_found() => {}
			Err(e) => return Err(e.into()),
		}

		tracing::info!(tenant = %tenant_name, user = %ObjectKey::of(&user), "Registration expanded");
		Ok(Outcome::Converged)
	}
}
