// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-key retry backoff for failed reconciles.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use atrium_server_k8s::ObjectKey;

const RETRY_FACTOR: u32 = 2;

/// Failure counts kept before the table is cleared wholesale.
pub const MAX_TRACKED_KEYS: usize = 4096;

/// Exponential delay for `attempt` (zero-based), capped at `max`.
pub fn capped_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
	let factor = RETRY_FACTOR.saturating_pow(attempt.min(31));
	base.saturating_mul(factor).min(max)
}

/// Spread `delay` uniformly over its upper half.
pub fn with_jitter(delay: Duration) -> Duration {
	let half = delay / 2;
	half + half.mul_f64(fastrand::f64())
}

/// Tracks consecutive failures per object and hands out retry delays.
#[derive(Debug)]
pub struct Backoff {
	base: Duration,
	max: Duration,
	attempts: Mutex<HashMap<ObjectKey, u32>>,
}

impl Backoff {
	pub fn new(base: Duration, max: Duration) -> Self {
		Self {
			base,
			max,
			attempts: Mutex::new(HashMap::new()),
		}
	}

	/// Record a failure for `key` and return how long to wait.
	pub fn next_delay(&self, key: &ObjectKey) -> Duration {
		let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
		if attempts.len() >= MAX_TRACKED_KEYS && !attempts.contains_key(key) {
			tracing::debug!(tracked = attempts.len(), "Backoff table full, resetting");
			attempts.clear();
		}
		let attempt = attempts.entry(key.clone()).or_insert(0);
		let delay = capped_delay(self.base, self.max, *attempt);
		*attempt = attempt.saturating_add(1);
		with_jitter(delay)
	}

	/// Forget failures for `key` after a successful reconcile or once the
	/// object is gone.
	pub fn reset(&self, key: &ObjectKey) {
		self.attempts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(key);
	}

	pub fn attempts(&self, key: &ObjectKey) -> u32 {
		self.attempts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(key)
			.copied()
			.unwrap_or(0)
	}

	/// Number of keys with recorded failures.
	pub fn tracked(&self) -> usize {
		self.attempts
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_capped_delay_doubles_until_max() {
		let base = Duration::from_millis(500);
		let max = Duration::from_secs(3);
		assert_eq!(capped_delay(base, max, 0), Duration::from_millis(500));
		assert_eq!(capped_delay(base, max, 1), Duration::from_secs(1));
		assert_eq!(capped_delay(base, max, 2), Duration::from_secs(2));
		assert_eq!(capped_delay(base, max, 3), max);
		assert_eq!(capped_delay(base, max, 40), max);
	}

	#[test]
	fn test_reset_clears_attempts() {
		let backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
		let key = ObjectKey::cluster("t1");
		backoff.next_delay(&key);
		backoff.next_delay(&key);
		assert_eq!(backoff.attempts(&key), 2);
		backoff.reset(&key);
		assert_eq!(backoff.attempts(&key), 0);
	}

	#[test]
	fn test_keys_are_independent() {
		let backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
		backoff.next_delay(&ObjectKey::cluster("a"));
		assert_eq!(backoff.attempts(&ObjectKey::cluster("b")), 0);
	}

	#[test]
	fn test_table_is_bounded() {
		let backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(1));
		for i in 0..MAX_TRACKED_KEYS {
			backoff.next_delay(&ObjectKey::cluster(format!("t{i}")));
		}
		assert_eq!(backoff.tracked(), MAX_TRACKED_KEYS);

		// A known key keeps counting without eviction.
		backoff.next_delay(&ObjectKey::cluster("t0"));
		assert_eq!(backoff.attempts(&ObjectKey::cluster("t0")), 2);
		assert_eq!(backoff.tracked(), MAX_TRACKED_KEYS);

		let fresh = ObjectKey::cluster("fresh");
		backoff.next_delay(&fresh);
		assert_eq!(backoff.tracked(), 1);
		assert_eq!(backoff.attempts(&fresh), 1);
	}

	proptest! {
		#[test]
		fn prop_jittered_delay_within_bounds(
			base_ms in 1u64..10_000,
			max_ms in 1u64..600_000,
			attempt in 0u32..64,
		) {
			let base = Duration::from_millis(base_ms);
			let max = Duration::from_millis(max_ms);
			let capped = capped_delay(base, max, attempt);
			prop_assert!(capped <= max);

			let jittered = with_jitter(capped);
			prop_assert!(jittered <= capped);
			prop_assert!(jittered >= capped / 2);
		}
	}
}
