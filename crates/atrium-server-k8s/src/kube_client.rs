// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::{FieldFilter, ResourceStore, WatchEvent, WatchStream};
use crate::error::{K8sError, K8sResult};
use crate::object::{ObjectKey, StoreObject};

/// Production store implementation backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
	client: Client,
}

impl KubeStore {
	/// Create a store that auto-discovers cluster configuration.
	///
	/// This will attempt to load config from:
	/// 1. In-cluster service account (when running in K8s)
	/// 2. KUBECONFIG environment variable
	/// 3. ~/.kube/config
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	pub fn from_client(client: Client) -> Self {
		Self { client }
	}

	/// Underlying client, for wiring kube runtime controllers.
	pub fn client(&self) -> Client {
		self.client.clone()
	}
}

#[async_trait]
impl ResourceStore for KubeStore {
	#[instrument(skip(self, obj), fields(kind = %K::kind_name(), name = %obj.name_any()))]
	async fn create<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		let api = K::api(self.client.clone(), obj.namespace().as_deref());
		api.create(&PostParams::default(), obj)
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &obj.name_any()))
	}

	async fn get<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<K> {
		let api = K::api(self.client.clone(), key.namespace());
		api.get(&key.name)
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &key.to_string()))
	}

	#[instrument(skip(self, obj), fields(kind = %K::kind_name(), name = %obj.name_any()))]
	async fn update<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		let api = K::api(self.client.clone(), obj.namespace().as_deref());
		let name = obj.name_any();
		api.replace(&name, &PostParams::default(), obj)
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &name))
	}

	#[instrument(skip(self, obj, status), fields(kind = %K::kind_name(), name = %obj.name_any()))]
	async fn patch_status<K: StoreObject>(&self, obj: &K, status: Value) -> K8sResult<K> {
		let api = K::api(self.client.clone(), obj.namespace().as_deref());
		let name = obj.name_any();
		let patch = json!({
			"metadata": { "resourceVersion": obj.resource_version() },
			"status": status,
		});
		api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &name))
	}

	#[instrument(skip(self), fields(kind = %K::kind_name(), key = %key))]
	async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<()> {
		let api = K::api(self.client.clone(), key.namespace());
		api.delete(&key.name, &DeleteParams::default())
			.await
			.map(|_| ())
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &key.to_string()))
	}

	async fn list<K: StoreObject>(
		&self,
		namespace: Option<&str>,
		filter: &FieldFilter,
	) -> K8sResult<Vec<K>> {
		let api = K::api(self.client.clone(), namespace);
		let items = api
			.list(&ListParams::default())
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), namespace.unwrap_or("*")))?
			.items;

		let mut matched = Vec::with_capacity(items.len());
		for item in items {
			if filter.matches_object(&item)? {
				matched.push(item);
			}
		}
		Ok(matched)
	}

	#[instrument(skip(self), fields(kind = %K::kind_name(), key = %key))]
	async fn watch<K: StoreObject>(
		&self,
		key: &ObjectKey,
		since: Option<String>,
	) -> K8sResult<WatchStream<K>> {
		let api = K::api(self.client.clone(), key.namespace());
		let params = WatchParams::default().fields(&format!("metadata.name={}", key.name));
		let version = since.unwrap_or_else(|| "0".to_string());
		let stream = api
			.watch(&params, &version)
			.await
			.map_err(|e| K8sError::from_kube(e, &K::kind_name(), &key.to_string()))?;

		let mapped = stream.map(|event| match event {
			Ok(kube::api::WatchEvent::Added(obj)) => Ok(WatchEvent::Added(obj)),
			Ok(kube::api::WatchEvent::Modified(obj)) => Ok(WatchEvent::Modified(obj)),
			Ok(kube::api::WatchEvent::Deleted(obj)) => Ok(WatchEvent::Deleted(obj)),
			Ok(kube::api::WatchEvent::Bookmark(_)) => Ok(WatchEvent::Bookmark),
			Ok(kube::api::WatchEvent::Error(err)) => Err(K8sError::Watch {
				message: err.message,
			}),
			Err(e) => Err(K8sError::Watch {
				message: e.to_string(),
			}),
		});
		Ok(Box::pin(mapped))
	}
}
