// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant reconciler.
//!
//! A Tenant owns one Namespace of the same name. Both carry the tenant
//! guard; teardown releases the Namespace's guard first and only then the
//! Tenant's own.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use atrium_common_resources::{Tenant, TENANT_FINALIZER, TENANT_LABEL};
use atrium_server_k8s::{
	add_finalizer, has_finalizer, is_deleting, Namespace, ObjectKey, ObjectMeta, ResourceStore,
};
use kube::ResourceExt;
use tracing::instrument;

use crate::error::ProvisionerError;
use crate::reconcile::{commit_status, get_or_create, owner_ref, release_guard, Outcome, Reconciler};

pub struct TenantReconciler<S> {
	store: Arc<S>,
}

impl<S: ResourceStore> TenantReconciler<S> {
	pub fn new(store: Arc<S>) -> Self {
		Self { store }
	}

	fn desired_namespace(tenant: &Tenant) -> Result<Namespace, ProvisionerError> {
		let name = tenant.name_any();
		Ok(Namespace {
			metadata: ObjectMeta {
				name: Some(name.clone()),
				labels: Some(BTreeMap::from([(TENANT_LABEL.to_string(), name)])),
				owner_references: Some(vec![owner_ref(tenant)?]),
				finalizers: Some(vec![TENANT_FINALIZER.to_string()]),
				..Default::default()
			},
			..Default::default()
		})
	}

	async fn ensure_namespace(&self, tenant: &Tenant) -> Result<(), ProvisionerError> {
		let desired = Self::desired_namespace(tenant)?;
		let mut namespace = get_or_create(self.store.as_ref(), &desired).await?;

		// Created by someone else without our guard.
		if !is_deleting(&namespace) && add_finalizer(&mut namespace, TENANT_FINALIZER) {
			self.store.update(&namespace).await?;
			tracing::info!(namespace = %namespace.name_any(), "Attached tenant guard to namespace");
		}
		Ok(())
	}

	async fn teardown(&self, tenant: &Tenant) -> Result<(), ProvisionerError> {
		let namespace_key = ObjectKey::cluster(tenant.name_any());
		release_guard::<S, Namespace>(self.store.as_ref(), &namespace_key, TENANT_FINALIZER).await?;

		if let Some(namespace) = self.store.get_opt::<Namespace>(&namespace_key).await? {
			if has_finalizer(&namespace, TENANT_FINALIZER) {
				return Err(ProvisionerError::GuardStillHeld {
					kind: "Namespace".to_string(),
					name: namespace.name_any(),
					guard: TENANT_FINALIZER.to_string(),
				});
			}
		}

		release_guard::<S, Tenant>(self.store.as_ref(), &ObjectKey::of(tenant), TENANT_FINALIZER)
			.await?;
		tracing::info!(tenant = %tenant.name_any(), "Tenant teardown complete");
		Ok(())
	}
}

#[async_trait]
impl<S: ResourceStore> Reconciler for TenantReconciler<S> {
	type Object = Tenant;

	#[instrument(skip(self, key), fields(tenant = %key))]
	async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ProvisionerError> {
		let Some(tenant) = self.store.get_opt::<Tenant>(key).await? else {
			tracing::debug!("Tenant not found, nothing to do");
			return Ok(Outcome::Converged);
		};

		if is_deleting(&tenant) {
			self.teardown(&tenant).await?;
			return Ok(Outcome::Converged);
		}

		let generation = tenant.metadata.generation.unwrap_or_default();
		if tenant.status.is_some() && tenant.last_generation() == generation {
			tracing::debug!(generation, "Tenant up to date");
			return Ok(Outcome::Converged);
		}

		self.ensure_namespace(&tenant).await?;
		commit_status(
			self.store.as_ref(),
			&tenant,
			serde_json::json!({ "lastGeneration": generation }),
		)
		.await?;

		tracing::info!(generation, "Tenant converged");
		Ok(Outcome::Converged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atrium_common_resources::TenantSpec;
	use atrium_server_k8s::{InMemoryStore, Verb};

	fn tenant(name: &str) -> Tenant {
		let mut tenant = Tenant::new(
			name,
			TenantSpec {
				country: "HU".into(),
				city: "Budapest".into(),
				address: "Addr 1".into(),
				postal_code: "1000".into(),
				..Default::default()
			},
		);
		add_finalizer(&mut tenant, TENANT_FINALIZER);
		tenant
	}

	#[tokio::test]
	async fn test_creates_guarded_namespace() {
		let store = Arc::new(InMemoryStore::new());
		store.create(&tenant("t1")).await.unwrap();
		let reconciler = TenantReconciler::new(Arc::clone(&store));

		let outcome = reconciler.reconcile(&ObjectKey::cluster("t1")).await.unwrap();
		assert_eq!(outcome, Outcome::Converged);

		let ns: Namespace = store.get(&ObjectKey::cluster("t1")).await.unwrap();
		assert!(has_finalizer(&ns, TENANT_FINALIZER));
		assert_eq!(ns.owner_references()[0].kind, "Tenant");

		let t: Tenant = store.get(&ObjectKey::cluster("t1")).await.unwrap();
		assert_eq!(t.last_generation(), 1);
	}

	#[tokio::test]
	async fn test_second_pass_is_a_no_op() {
		let store = Arc::new(InMemoryStore::new());
		store.create(&tenant("t1")).await.unwrap();
		let reconciler = TenantReconciler::new(Arc::clone(&store));
		let key = ObjectKey::cluster("t1");

		reconciler.reconcile(&key).await.unwrap();
		store.clear_journal();
		reconciler.reconcile(&key).await.unwrap();
		assert!(store.journal().is_empty());
	}

	#[tokio::test]
	async fn test_missing_tenant_is_not_an_error() {
		let store = Arc::new(InMemoryStore::new());
		let reconciler = TenantReconciler::new(store);
		let outcome = reconciler.reconcile(&ObjectKey::cluster("gone")).await.unwrap();
		assert_eq!(outcome, Outcome::Converged);
	}

	#[tokio::test]
	async fn test_teardown_releases_namespace_before_tenant() {
		let store = Arc::new(InMemoryStore::new());
		store.create(&tenant("t1")).await.unwrap();
		let reconciler = TenantReconciler::new(Arc::clone(&store));
		let key = ObjectKey::cluster("t1");
		reconciler.reconcile(&key).await.unwrap();

		store.delete::<Tenant>(&key).await.unwrap();
		store.clear_journal();
		reconciler.reconcile(&key).await.unwrap();

		let updates: Vec<String> = store
			.journal()
			.into_iter()
			.filter(|e| e.verb == Verb::Update)
			.map(|e| e.kind)
			.collect();
		assert_eq!(updates, vec!["Namespace".to_string(), "Tenant".to_string()]);
		assert!(store.get_opt::<Tenant>(&key).await.unwrap().is_none());
		assert!(store.get_opt::<Namespace>(&key).await.unwrap().is_none());
	}
}
