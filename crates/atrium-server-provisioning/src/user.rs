// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User reconciler.
//!
//! Converges the access scope (Role, RoleBinding, ServiceAccount) and the
//! credential Secret for a User, then records the outcome in status.

use std::sync::Arc;

use async_trait::async_trait;
use atrium_common_resources::{ObjectRef, User, UserPhase, UserStatus, FOREGROUND_DELETION};
use atrium_server_k8s::{is_deleting, K8sError, ObjectKey, ResourceStore, Role};
use tracing::instrument;

use crate::access::{build_role, build_role_binding, build_service_account, AccessPolicy};
use crate::credential;
use crate::error::ProvisionerError;
use crate::reconcile::{commit_status, get_or_create, release_guard, Outcome, Reconciler};

pub struct UserReconciler<S> {
	store: Arc<S>,
	policy: AccessPolicy,
}

impl<S: ResourceStore> UserReconciler<S> {
	pub fn new(store: Arc<S>, policy: AccessPolicy) -> Self {
		Self { store, policy }
	}

	/// Create the Role, or replace its rules wholesale when they drifted.
	async fn upsert_role(&self, user: &User) -> Result<Role, ProvisionerError> {
		let desired = build_role(user, &self.policy)?;
		match self.store.create(&desired).await {
			Ok(role) => {
				tracing::info!(role = %ObjectKey::of(&role), "Created role");
				Ok(role)
			}
			Err(e) if e.is_already_exists() => {
				let mut current: Role = self.store.get(&ObjectKey::of(&desired)).await?;
				if current.rules == desired.rules {
					return Ok(current);
				}
				current.rules = desired.rules;
				let role = self.store.update(&current).await?;
				tracing::info!(role = %ObjectKey::of(&role), "Replaced role rules");
				Ok(role)
			}
			Err(e) => Err(e.into()),
		}
	}
}

fn status_patch(user: &User, generation: i64, password_ref: Option<ObjectRef>) -> UserStatus {
	let previous = user.status.clone().unwrap_or_default();
	UserStatus {
		last_generation: generation,
		phase: Some(previous.phase.unwrap_or(UserPhase::Pending)),
		password_ref: password_ref.or(previous.password_ref),
		tenant_refs: user
			.tenant_name()
			.map(|tenant| vec![ObjectRef::new(tenant)])
			.unwrap_or(previous.tenant_refs),
	}
}

#[async_trait]
impl<S: ResourceStore> Reconciler for UserReconciler<S> {
	type Object = User;

	#[instrument(skip(self, key), fields(user = %key))]
	async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ProvisionerError> {
		let Some(user) = self.store.get_opt::<User>(key).await? else {
			tracing::debug!("User not found, nothing to do");
			return Ok(Outcome::Converged);
		};

		// Dependents go with the owner link; only the foreground guard is ours to drop.
		if is_deleting(&user) {
			release_guard::<S, User>(self.store.as_ref(), key, FOREGROUND_DELETION).await?;
			return Ok(Outcome::Converged);
		}

		let generation = user.metadata.generation.unwrap_or_default();
		if user.status.is_some() && user.last_generation() == generation {
			tracing::debug!(generation, "User up to date");
			return Ok(Outcome::Converged);
		}

		self.upsert_role(&user).await?;
		get_or_create(self.store.as_ref(), &build_role_binding(&user)?).await?;
		get_or_create(self.store.as_ref(), &build_service_account(&user)?).await?;

		let materialized = credential::materialize(self.store.as_ref(), user).await?;
		let status = status_patch(&materialized.user, generation, materialized.password_ref);
		commit_status(
			self.store.as_ref(),
			&materialized.user,
			serde_json::to_value(&status).map_err(K8sError::from)?,
		)
		.await?;

		tracing::info!(generation, "User converged");
		Ok(Outcome::Converged)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::access::PolicyEntry;
	use crate::credential::{hash_password, secret_name, Plaintext, SECRET_KEY};
	use atrium_common_resources::{UserSpec, PASSWORD_ANNOTATION, TENANT_LABEL};
	use atrium_server_k8s::{add_finalizer, InMemoryStore, Secret};
	use kube::ResourceExt;

	fn user_with_credential() -> User {
		let mut user = User::new(
			"ada",
			UserSpec {
				first_name: "Ada".into(),
				last_name: "Lovelace".into(),
				email: "ada@example.test".into(),
				phone_number: None,
			},
		);
		user.metadata.namespace = Some("default".into());
		user.annotations_mut().insert(
			PASSWORD_ANNOTATION.into(),
			hash_password(&Plaintext::new("Passw0rd!")).unwrap(),
		);
		user.labels_mut()
			.insert(TENANT_LABEL.into(), "tenant-1".into());
		user
	}

	#[tokio::test]
	async fn test_converges_access_scope_and_status() {
		let store = Arc::new(InMemoryStore::new());
		store.create(&user_with_credential()).await.unwrap();
		let reconciler = UserReconciler::new(Arc::clone(&store), AccessPolicy::standard());
		let key = ObjectKey::namespaced("default", "ada");

		reconciler.reconcile(&key).await.unwrap();

		let user: User = store.get(&key).await.unwrap();
		let status = user.status.clone().unwrap();
		assert_eq!(status.last_generation, 1);
		assert_eq!(status.phase, Some(UserPhase::Pending));
		assert_eq!(status.password_ref, Some(ObjectRef::new(secret_name(&user))));
		assert_eq!(status.tenant_refs, vec![ObjectRef::new("tenant-1")]);
		assert!(user.pending_credential().is_none());

		let secret: Secret = store
			.get(&ObjectKey::namespaced("default", "ada-password"))
			.await
			.unwrap();
		assert!(!secret.data.unwrap()[SECRET_KEY].0.is_empty());
		assert!(store
			.get_opt::<Role>(&ObjectKey::namespaced("default", "user-ada"))
			.await
			.unwrap()
			.is_some());
	}

	#[tokio::test]
	async fn test_policy_change_replaces_rules() {
		let store = Arc::new(InMemoryStore::new());
		store.create(&user_with_credential()).await.unwrap();
		let key = ObjectKey::namespaced("default", "ada");
		UserReconciler::new(Arc::clone(&store), AccessPolicy::standard())
			.reconcile(&key)
			.await
			.unwrap();

		let mut user: User = store.get(&key).await.unwrap();
		user.spec.phone_number = Some("+3612345678".into());
		store.update(&user).await.unwrap();

		let narrowed = AccessPolicy::new(vec![PolicyEntry::new(
			atrium_common_resources::GROUP,
			"orders",
			&["get"],
		)]);
		UserReconciler::new(Arc::clone(&store), narrowed.clone())
			.reconcile(&key)
			.await
			.unwrap();

		let role: Role = store
			.get(&ObjectKey::namespaced("default", "user-ada"))
			.await
			.unwrap();
		assert_eq!(role.rules, Some(narrowed.rules_for("ada")));
	}

	#[tokio::test]
	async fn test_deleting_user_drops_foreground_guard() {
		let store = Arc::new(InMemoryStore::new());
		let mut user = user_with_credential();
		add_finalizer(&mut user, FOREGROUND_DELETION);
		add_finalizer(&mut user, "example.dev/hold");
		store.create(&user).await.unwrap();
		let key = ObjectKey::namespaced("default", "ada");

		store.delete::<User>(&key).await.unwrap();
		UserReconciler::new(Arc::clone(&store), AccessPolicy::standard())
			.reconcile(&key)
			.await
			.unwrap();

		let user: User = store.get(&key).await.unwrap();
		assert_eq!(user.finalizers().to_vec(), vec!["example.dev/hold".to_string()]);
	}
}
