// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciler scheduling configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_NAMESPACE_POLL_MS: u64 = 1000;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Controller configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
	pub resync_interval_secs: u64,
	/// Re-check delay while a new tenant's namespace does not exist yet
	pub namespace_poll_ms: u64,
	/// Parallel reconciles per kind
	pub concurrency: usize,
	pub backoff_base_ms: u64,
	pub backoff_max_secs: u64,
}

impl ControllerConfig {
	pub fn resync_interval(&self) -> Duration {
		Duration::from_secs(self.resync_interval_secs)
	}

	pub fn namespace_poll_interval(&self) -> Duration {
		Duration::from_millis(self.namespace_poll_ms)
	}

	pub fn backoff_base(&self) -> Duration {
		Duration::from_millis(self.backoff_base_ms)
	}

	pub fn backoff_max(&self) -> Duration {
		Duration::from_secs(self.backoff_max_secs)
	}
}

impl Default for ControllerConfig {
	fn default() -> Self {
		Self {
			resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
			namespace_poll_ms: DEFAULT_NAMESPACE_POLL_MS,
			concurrency: DEFAULT_CONCURRENCY,
			backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
			backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
		}
	}
}

/// Controller configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerConfigLayer {
	#[serde(default)]
	pub resync_interval_secs: Option<u64>,
	#[serde(default)]
	pub namespace_poll_ms: Option<u64>,
	#[serde(default)]
	pub concurrency: Option<usize>,
	#[serde(default)]
	pub backoff_base_ms: Option<u64>,
	#[serde(default)]
	pub backoff_max_secs: Option<u64>,
}

impl ControllerConfigLayer {
	pub fn merge(&mut self, other: ControllerConfigLayer) {
		if other.resync_interval_secs.is_some() {
			self.resync_interval_secs = other.resync_interval_secs;
		}
		if other.namespace_poll_ms.is_some() {
			self.namespace_poll_ms = other.namespace_poll_ms;
		}
		if other.concurrency.is_some() {
			self.concurrency = other.concurrency;
		}
		if other.backoff_base_ms.is_some() {
			self.backoff_base_ms = other.backoff_base_ms;
		}
		if other.backoff_max_secs.is_some() {
			self.backoff_max_secs = other.backoff_max_secs;
		}
	}

	pub fn finalize(self) -> ControllerConfig {
		ControllerConfig {
			resync_interval_secs: self
				.resync_interval_secs
				.unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
			namespace_poll_ms: self.namespace_poll_ms.unwrap_or(DEFAULT_NAMESPACE_POLL_MS),
			concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
			backoff_base_ms: self.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS),
			backoff_max_secs: self.backoff_max_secs.unwrap_or(DEFAULT_BACKOFF_MAX_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = ControllerConfigLayer::default().finalize();
		assert_eq!(config, ControllerConfig::default());
		assert_eq!(config.namespace_poll_interval(), Duration::from_secs(1));
		assert_eq!(config.backoff_max(), Duration::from_secs(300));
	}

	#[test]
	fn test_merge_overrides_only_set_fields() {
		let mut base = ControllerConfigLayer {
			concurrency: Some(2),
			resync_interval_secs: Some(60),
			..Default::default()
		};
		base.merge(ControllerConfigLayer {
			concurrency: Some(16),
			..Default::default()
		});
		let config = base.finalize();
		assert_eq!(config.concurrency, 16);
		assert_eq!(config.resync_interval_secs, 60);
	}

	mod proptests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#[test]
			fn later_layer_wins(first in any::<u64>(), second in any::<u64>()) {
				let mut base = ControllerConfigLayer {
					namespace_poll_ms: Some(first),
					..Default::default()
				};
				base.merge(ControllerConfigLayer {
					namespace_poll_ms: Some(second),
					..Default::default()
				});
				prop_assert_eq!(base.finalize().namespace_poll_ms, second);
			}
		}
	}
}
