// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Object identity and the trait every stored kind implements.

use std::fmt;

use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A declarative object kind the store can hold.
///
/// Implemented for the built-in kinds the provisioning engine touches and,
/// via [`namespaced_object!`](crate::namespaced_object) and
/// [`cluster_object!`](crate::cluster_object), for custom resources.
pub trait StoreObject:
	Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
	/// Whether objects of this kind live inside a scope container.
	const NAMESPACED: bool;

	/// Build a typed kube API handle for this kind.
	fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

	/// Stable name used for store bookkeeping and error messages.
	fn kind_name() -> String {
		Self::kind(&()).into_owned()
	}
}

/// Implement [`StoreObject`] for namespaced kinds.
#[macro_export]
macro_rules! namespaced_object {
	($($ty:ty),* $(,)?) => {
		$(
			impl $crate::StoreObject for $ty {
				const NAMESPACED: bool = true;

				fn api(
					client: $crate::kube::Client,
					namespace: Option<&str>,
				) -> $crate::kube::Api<Self> {
					match namespace {
						Some(ns) => $crate::kube::Api::namespaced(client, ns),
						None => $crate::kube::Api::all(client),
					}
				}
			}
		)*
	};
}

/// Implement [`StoreObject`] for cluster-scoped kinds.
#[macro_export]
macro_rules! cluster_object {
	($($ty:ty),* $(,)?) => {
		$(
			impl $crate::StoreObject for $ty {
				const NAMESPACED: bool = false;

				fn api(
					client: $crate::kube::Client,
					_namespace: Option<&str>,
				) -> $crate::kube::Api<Self> {
					$crate::kube::Api::all(client)
				}
			}
		)*
	};
}

cluster_object!(Namespace);
namespaced_object!(Role, RoleBinding, ServiceAccount, Secret);

/// Identity of a stored object: optional scope container plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
	pub namespace: Option<String>,
	pub name: String,
}

impl ObjectKey {
	pub fn cluster(name: impl Into<String>) -> Self {
		Self {
			namespace: None,
			name: name.into(),
		}
	}

	pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: Some(namespace.into()),
			name: name.into(),
		}
	}

	/// Key of an existing object.
	pub fn of<K: ResourceExt>(obj: &K) -> Self {
		Self {
			namespace: obj.namespace(),
			name: obj.name_any(),
		}
	}

	pub fn namespace(&self) -> Option<&str> {
		self.namespace.as_deref()
	}
}

impl fmt::Display for ObjectKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Some(ns) => write!(f, "{ns}/{}", self.name),
			None => f.write_str(&self.name),
		}
	}
}

/// Whether the store has begun removing this object.
pub fn is_deleting<K: Resource>(obj: &K) -> bool {
	obj.meta().deletion_timestamp.is_some()
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
	obj.meta()
		.finalizers
		.as_ref()
		.is_some_and(|f| f.iter().any(|name| name == finalizer))
}

/// Attach a deletion guard. Returns true when the object changed.
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
	if has_finalizer(obj, finalizer) {
		return false;
	}
	obj.meta_mut()
		.finalizers
		.get_or_insert_with(Vec::new)
		.push(finalizer.to_string());
	true
}

/// Release a deletion guard. Returns true when the object changed.
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
	let Some(finalizers) = obj.meta_mut().finalizers.as_mut() else {
		return false;
	};
	let before = finalizers.len();
	finalizers.retain(|name| name != finalizer);
	before != finalizers.len()
}
