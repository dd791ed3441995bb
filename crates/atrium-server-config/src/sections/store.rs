// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resource store configuration.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

const DEFAULT_REGISTRATION_NAMESPACE: &str = "default";

/// Where objects are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
	/// The Kubernetes API server from the ambient kubeconfig
	#[default]
	Kubernetes,
	/// Process-local store, lost on exit
	Memory,
}

impl FromStr for StoreBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"kubernetes" | "k8s" => Ok(StoreBackend::Kubernetes),
			"memory" => Ok(StoreBackend::Memory),
			other => Err(format!("unknown store backend '{other}'")),
		}
	}
}

impl fmt::Display for StoreBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreBackend::Kubernetes => write!(f, "kubernetes"),
			StoreBackend::Memory => write!(f, "memory"),
		}
	}
}

/// Store configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
	pub backend: StoreBackend,
	/// Namespace RegistrationRequests are created in
	pub registration_namespace: String,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			backend: StoreBackend::default(),
			registration_namespace: DEFAULT_REGISTRATION_NAMESPACE.to_string(),
		}
	}
}

/// Store configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfigLayer {
	#[serde(default)]
	pub backend: Option<StoreBackend>,
	#[serde(default)]
	pub registration_namespace: Option<String>,
}

impl StoreConfigLayer {
	pub fn merge(&mut self, other: StoreConfigLayer) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.registration_namespace.is_some() {
			self.registration_namespace = other.registration_namespace;
		}
	}

	pub fn finalize(self) -> StoreConfig {
		StoreConfig {
			backend: self.backend.unwrap_or_default(),
			registration_namespace: self
				.registration_namespace
				.unwrap_or_else(|| DEFAULT_REGISTRATION_NAMESPACE.to_string()),
		}
	}
}
