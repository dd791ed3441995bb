// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::{K8sError, K8sResult};
use crate::object::{ObjectKey, StoreObject};

/// A change observed on a watched object.
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
	Added(K),
	Modified(K),
	Deleted(K),
	/// Progress marker with no object payload.
	Bookmark,
}

impl<K> WatchEvent<K> {
	pub fn object(&self) -> Option<&K> {
		match self {
			WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => Some(obj),
			WatchEvent::Bookmark => None,
		}
	}
}

/// Stream of watch events for a single kind.
pub type WatchStream<K> = Pin<Box<dyn Stream<Item = K8sResult<WatchEvent<K>>> + Send>>;

/// Equality filter over dotted field paths, e.g. `spec.email`.
///
/// Applied client-side so it works for custom resource fields the API
/// server cannot select on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldFilter {
	fields: Vec<(String, String)>,
}

impl FieldFilter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Require `path` to equal `value`.
	pub fn eq(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
		self.fields.push((path.into(), value.into()));
		self
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Whether a serialized object satisfies every clause.
	pub fn matches(&self, object: &Value) -> bool {
		self.fields.iter().all(|(path, expected)| {
			let found = path
				.split('.')
				.try_fold(object, |current, segment| current.get(segment));
			matches!(found, Some(Value::String(actual)) if actual == expected)
		})
	}

	/// Typed variant of [`FieldFilter::matches`].
	pub fn matches_object<K: serde::Serialize>(&self, object: &K) -> K8sResult<bool> {
		if self.is_empty() {
			return Ok(true);
		}
		let value = serde_json::to_value(object).map_err(K8sError::from)?;
		Ok(self.matches(&value))
	}
}

/// Typed access to the shared, watchable object store.
///
/// Every operation is scoped by kind (the type parameter), an optional
/// scope container and a name. Updates and status patches carry the
/// resourceVersion of the object they were derived from, so a stale write
/// fails with [`K8sError::Conflict`].
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
	/// Create a new object. Fails with `AlreadyExists` if the name is taken.
	async fn create<K: StoreObject>(&self, obj: &K) -> K8sResult<K>;

	/// Get an object by identity.
	async fn get<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<K>;

	/// Get an object, mapping not-found to `None`.
	async fn get_opt<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<Option<K>> {
		match self.get(key).await {
			Ok(obj) => Ok(Some(obj)),
			Err(e) if e.is_not_found() => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Replace an object's metadata and spec. Status is left untouched.
	async fn update<K: StoreObject>(&self, obj: &K) -> K8sResult<K>;

	/// Merge-patch the status of `obj`, guarded by its resourceVersion.
	async fn patch_status<K: StoreObject>(&self, obj: &K, status: Value) -> K8sResult<K>;

	/// Request deletion. Guarded objects are marked and kept until every
	/// deletion guard is released.
	async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<()>;

	/// List objects of a kind, optionally within one scope container.
	async fn list<K: StoreObject>(
		&self,
		namespace: Option<&str>,
		filter: &FieldFilter,
	) -> K8sResult<Vec<K>>;

	/// Watch a single object. With `since` set, events after that
	/// resourceVersion are delivered; otherwise only future events.
	async fn watch<K: StoreObject>(
		&self,
		key: &ObjectKey,
		since: Option<String>,
	) -> K8sResult<WatchStream<K>>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_filter_matches_nested_path() {
		let filter = FieldFilter::new().eq("spec.email", "ada@example.test");
		assert!(filter.matches(&json!({"spec": {"email": "ada@example.test"}})));
		assert!(!filter.matches(&json!({"spec": {"email": "bob@example.test"}})));
		assert!(!filter.matches(&json!({"spec": {}})));
	}

	#[test]
	fn test_empty_filter_matches_everything() {
		assert!(FieldFilter::new().matches(&json!({})));
	}

	#[test]
	fn test_filter_ignores_non_string_fields() {
		let filter = FieldFilter::new().eq("metadata.generation", "1");
		assert!(!filter.matches(&json!({"metadata": {"generation": 1}})));
	}

	#[test]
	fn test_bookmark_has_no_payload() {
		let event: WatchEvent<String> = WatchEvent::Bookmark;
		assert!(event.object().is_none());
		let event = WatchEvent::Deleted("x".to_string());
		assert_eq!(event.object().map(String::as_str), Some("x"));
	}
}
