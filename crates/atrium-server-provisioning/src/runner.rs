// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Full-resync scheduler.
//!
//! Each pass lists every object of every kind and reconciles them one key
//! at a time, so an identity is never reconciled concurrently with itself.
//! Works against any [`ResourceStore`], which makes it the scheduler for
//! the in-memory backend and for tests.

use std::time::Duration;

use atrium_server_k8s::{FieldFilter, ObjectKey, ResourceStore, StoreObject};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::provisioner::Provisioner;
use crate::reconcile::{Outcome, Reconciler};

/// What one resync pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
	pub converged: usize,
	pub requeued: usize,
	pub failed: usize,
}

impl PassReport {
	/// Whether anything asked to run again soon.
	pub fn is_settled(&self) -> bool {
		self.requeued == 0 && self.failed == 0
	}
}

pub struct ResyncRunner<S> {
	provisioner: Provisioner<S>,
	tick: Duration,
}

impl<S: ResourceStore> ResyncRunner<S> {
	pub fn new(provisioner: Provisioner<S>, tick: Duration) -> Self {
		Self { provisioner, tick }
	}

	pub fn provisioner(&self) -> &Provisioner<S> {
		&self.provisioner
	}

	async fn pass_kind<R>(&self, reconciler: &R, report: &mut PassReport)
	where
		R: Reconciler,
	{
		let objects = match self
			.provisioner
			.store()
			.list::<R::Object>(None, &FieldFilter::new())
			.await
		{
			Ok(objects) => objects,
			Err(e) => {
				warn!(kind = %<R::Object as StoreObject>::kind_name(), error = %e, "Failed to list objects");
				report.failed += 1;
				return;
			}
		};

		for obj in &objects {
			let key = ObjectKey::of(obj);
			match reconciler.reconcile(&key).await {
				Ok(Outcome::Converged) => report.converged += 1,
				Ok(Outcome::Requeue(_)) => report.requeued += 1,
				Err(e) => {
					warn!(key = %key, error = %e, "Reconcile failed, will retry next pass");
					report.failed += 1;
				}
			}
		}
	}

	/// Reconcile every object of every kind once.
	#[instrument(skip(self))]
	pub async fn reconcile_all_once(&self) -> PassReport {
		let mut report = PassReport::default();
		self.pass_kind(&self.provisioner.registrations, &mut report).await;
		self.pass_kind(&self.provisioner.tenants, &mut report).await;
		self.pass_kind(&self.provisioner.users, &mut report).await;
		report
	}

	/// Run passes every tick until `shutdown` fires.
	pub async fn run(&self, shutdown: CancellationToken) {
		info!(tick_ms = self.tick.as_millis() as u64, "Resync runner started");
		loop {
			let report = self.reconcile_all_once().await;
			if !report.is_settled() {
				tracing::debug!(?report, "Resync pass left work behind");
			}

			tokio::select! {
				_ = tokio::time::sleep(self.tick) => {}
				_ = shutdown.cancelled() => {
					info!("Resync runner shutting down");
					break;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ProvisionerConfig;
	use atrium_server_k8s::InMemoryStore;
	use std::sync::Arc;

	#[tokio::test]
	async fn test_empty_store_pass_is_settled() {
		let store = Arc::new(InMemoryStore::new());
		let runner = ResyncRunner::new(
			Provisioner::new(store, ProvisionerConfig::default()),
			Duration::from_millis(10),
		);
		let report = runner.reconcile_all_once().await;
		assert_eq!(report, PassReport::default());
		assert!(report.is_settled());
	}

	#[tokio::test]
	async fn test_run_stops_on_cancel() {
		let store = Arc::new(InMemoryStore::new());
		let runner = Arc::new(ResyncRunner::new(
			Provisioner::new(store, ProvisionerConfig::default()),
			Duration::from_millis(5),
		));
		let token = CancellationToken::new();
		let handle = tokio::spawn({
			let runner = Arc::clone(&runner);
			let token = token.clone();
			async move { runner.run(token).await }
		});
		tokio::time::sleep(Duration::from_millis(20)).await;
		token.cancel();
		tokio::time::timeout(Duration::from_secs(1), handle)
			.await
			.unwrap()
			.unwrap();
	}
}
