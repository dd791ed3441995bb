// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Resource store abstraction for Atrium provisioning.
//!
//! This crate provides a trait-based abstraction over the shared object
//! store, enabling easy mocking in tests while supporting real Kubernetes
//! clusters in production.
//!
//! # Example
//!
//! ```ignore
//! use atrium_server_k8s::{KubeStore, ObjectKey, ResourceStore};
//! use k8s_openapi::api::core::v1::Namespace;
//!
//! let store = KubeStore::new().await?;
//! let ns: Namespace = store.get(&ObjectKey::cluster("tenant-a")).await?;
//! ```

mod client;
mod error;
mod kube_client;
mod memory;
mod object;

pub use client::{FieldFilter, ResourceStore, WatchEvent, WatchStream};
pub use error::{K8sError, K8sResult};
pub use kube_client::KubeStore;
pub use memory::{InMemoryStore, JournalEntry, Verb};
pub use object::{add_finalizer, has_finalizer, is_deleting, remove_finalizer, ObjectKey, StoreObject};

pub use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
pub use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
pub use k8s_openapi::ByteString;

#[doc(hidden)]
pub use kube;
