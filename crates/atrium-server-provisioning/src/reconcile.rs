// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Building blocks shared by every per-kind reconciler.

use std::time::Duration;

use async_trait::async_trait;
use atrium_server_k8s::{
	remove_finalizer, ObjectKey, OwnerReference, ResourceStore, StoreObject,
};
use kube::{Resource, ResourceExt};
use serde_json::Value;

use crate::error::ProvisionerError;

/// Result of one reconcile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	/// Nothing more to do until the object changes or the next resync.
	Converged,
	/// Run again after the delay; not an error.
	Requeue(Duration),
}

/// Level-triggered reconciler for one object kind.
///
/// Each invocation reads the object fresh by key and must be safe to
/// repeat from the top after any failure.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
	type Object: StoreObject;

	async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ProvisionerError>;
}

/// Ownership link with `controller` and `blockOwnerDeletion` set.
pub fn owner_ref<K>(owner: &K) -> Result<OwnerReference, ProvisionerError>
where
	K: Resource<DynamicType = ()>,
{
	let mut link = owner
		.controller_owner_ref(&())
		.ok_or_else(|| ProvisionerError::missing_uid(&K::kind(&()), &owner.name_any()))?;
	link.block_owner_deletion = Some(true);
	Ok(link)
}

/// Create `desired`, treating an existing object as success.
///
/// Returns the stored object, re-read when another writer got there first.
pub async fn get_or_create<S, K>(store: &S, desired: &K) -> Result<K, ProvisionerError>
where
	S: ResourceStore,
	K: StoreObject,
{
	match store.create(desired).await {
		Ok(created) => {
			tracing::info!(kind = %K::kind_name(), key = %ObjectKey::of(desired), "Created dependent");
			Ok(created)
		}
		Err(e) if e.is_already_exists() => {
			tracing::debug!(kind = %K::kind_name(), key = %ObjectKey::of(desired), "Dependent already exists");
			Ok(store.get(&ObjectKey::of(desired)).await?)
		}
		Err(e) => Err(e.into()),
	}
}

/// Patch status, swallowing not-found for objects deleted concurrently.
pub async fn commit_status<S, K>(store: &S, obj: &K, status: Value) -> Result<(), ProvisionerError>
where
	S: ResourceStore,
	K: StoreObject,
{
	match store.patch_status(obj, status).await {
		Ok(_) => Ok(()),
		Err(e) if e.is_not_found() => {
			tracing::debug!(kind = %K::kind_name(), key = %ObjectKey::of(obj), "Object gone before status commit");
			Ok(())
		}
		Err(e) => Err(e.into()),
	}
}

/// Release a deletion guard held on `key`.
///
/// Returns `false` when the object is already gone.
pub async fn release_guard<S, K>(
	store: &S,
	key: &ObjectKey,
	guard: &str,
) -> Result<bool, ProvisionerError>
where
	S: ResourceStore,
	K: StoreObject,
{
	let Some(mut obj) = store.get_opt::<K>(key).await? else {
		return Ok(false);
	};
	if !remove_finalizer(&mut obj, guard) {
		return Ok(true);
	}
	match store.update(&obj).await {
		Ok(_) => {
			tracing::info!(kind = %K::kind_name(), key = %key, guard, "Released deletion guard");
			Ok(true)
		}
		Err(e) if e.is_not_found() => Ok(false),
		Err(e) => Err(e.into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atrium_server_k8s::{add_finalizer, has_finalizer, InMemoryStore, Namespace, ObjectMeta};

	fn namespace(name: &str) -> Namespace {
		Namespace {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				..Default::default()
			},
			..Default::default()
		}
	}

	#[tokio::test]
	async fn test_get_or_create_tolerates_existing() {
		let store = InMemoryStore::new();
		let first = get_or_create(&store, &namespace("a")).await.unwrap();
		let second = get_or_create(&store, &namespace("a")).await.unwrap();
		assert_eq!(first.metadata.uid, second.metadata.uid);
	}

	#[tokio::test]
	async fn test_commit_status_swallows_not_found() {
		let store = InMemoryStore::new();
		let ns = store.create(&namespace("a")).await.unwrap();
		store
			.delete::<Namespace>(&ObjectKey::cluster("a"))
			.await
			.unwrap();
		commit_status(&store, &ns, serde_json::json!({"phase": "Active"}))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn test_release_guard() {
		let store = InMemoryStore::new();
		let mut ns = namespace("a");
		add_finalizer(&mut ns, "example.dev/guard");
		store.create(&ns).await.unwrap();
		let key = ObjectKey::cluster("a");

		assert!(release_guard::<_, Namespace>(&store, &key, "example.dev/guard")
			.await
			.unwrap());
		let ns: Namespace = store.get(&key).await.unwrap();
		assert!(!has_finalizer(&ns, "example.dev/guard"));

		assert!(!release_guard::<_, Namespace>(&store, &ObjectKey::cluster("gone"), "g")
			.await
			.unwrap());
	}

	#[test]
	fn test_owner_ref_requires_uid() {
		assert!(owner_ref(&namespace("a")).is_err());
		let mut ns = namespace("a");
		ns.metadata.uid = Some("uid-1".into());
		let owner = owner_ref(&ns).unwrap();
		assert_eq!(owner.uid, "uid-1");
		assert_eq!(owner.controller, Some(true));
		assert_eq!(owner.block_owner_deletion, Some(true));
	}
}
