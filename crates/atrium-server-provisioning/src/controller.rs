// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! kube-runtime controllers for a live cluster.
//!
//! One controller per kind, each with its own work queue. The queue
//! serializes reconciles per object; owned kinds re-trigger their owner.

use std::sync::Arc;
use std::time::Duration;

use atrium_common_resources::{RegistrationRequest, Tenant, User};
use atrium_server_k8s::{
	Namespace, ObjectKey, ResourceStore, Role, RoleBinding, Secret, ServiceAccount,
};
use futures::StreamExt;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client};

use crate::backoff::Backoff;
use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::reconcile::{Outcome, Reconciler};
use crate::registration::RegistrationReconciler;
use crate::tenant::TenantReconciler;
use crate::user::UserReconciler;

/// Shared state handed to every reconcile of one controller.
pub struct ControllerContext<R> {
	reconciler: R,
	backoff: Backoff,
	resync: Duration,
}

impl<R: Reconciler> ControllerContext<R> {
	pub fn new(reconciler: R, config: &ProvisionerConfig) -> Self {
		Self {
			reconciler,
			backoff: Backoff::new(config.backoff_base, config.backoff_max),
			resync: config.resync_interval,
		}
	}

	/// Map a reconcile outcome to the next scheduling action.
	pub fn action_for(&self, key: &ObjectKey, outcome: Outcome) -> Action {
		self.backoff.reset(key);
		match outcome {
			Outcome::Converged => Action::requeue(self.resync),
			Outcome::Requeue(delay) => Action::requeue(delay),
		}
	}

	/// Map a reconcile failure to a retry. A not-found failure drops the
	/// key from the backoff table and falls back to the resync interval.
	pub fn action_for_error(&self, key: &ObjectKey, error: &ProvisionerError) -> Action {
		if error.is_not_found() {
			self.backoff.reset(key);
			tracing::debug!(key = %key, error = %error, "Object gone, retrying on resync");
			return Action::requeue(self.resync);
		}
		let delay = self.backoff.next_delay(key);
		tracing::warn!(
			key = %key,
			error = %error,
			retry_in_ms = delay.as_millis() as u64,
			"Reconcile failed, retrying"
		);
		Action::requeue(delay)
	}

	pub fn backoff(&self) -> &Backoff {
		&self.backoff
	}
}

async fn reconcile<R: Reconciler>(
	obj: Arc<R::Object>,
	ctx: Arc<ControllerContext<R>>,
) -> Result<Action, ProvisionerError> {
	let key = ObjectKey::of(obj.as_ref());
	let outcome = ctx.reconciler.reconcile(&key).await?;
	Ok(ctx.action_for(&key, outcome))
}

fn error_policy<R: Reconciler>(
	obj: Arc<R::Object>,
	error: &ProvisionerError,
	ctx: Arc<ControllerContext<R>>,
) -> Action {
	ctx.action_for_error(&ObjectKey::of(obj.as_ref()), error)
}

async fn drive<R: Reconciler>(
	controller: Controller<R::Object>,
	reconciler: R,
	config: &ProvisionerConfig,
) {
	let concurrency = u16::try_from(config.concurrency).unwrap_or(u16::MAX);
	let ctx = Arc::new(ControllerContext::new(reconciler, config));
	controller
		.with_config(controller::Config::default().concurrency(concurrency))
		.shutdown_on_signal()
		.run(reconcile::<R>, error_policy::<R>, ctx)
		.for_each(|result| async move {
			match result {
				Ok((obj, _)) => tracing::debug!(object = %obj, "Reconciled"),
				Err(e) => tracing::warn!(error = %e, "Controller error"),
			}
		})
		.await;
}

/// Run the RegistrationRequest, Tenant and User controllers until shutdown.
pub async fn run_controllers<S: ResourceStore>(client: Client, store: Arc<S>, config: ProvisionerConfig) {
	let wc = watcher::Config::default;

	let registrations = Controller::new(
		Api::<RegistrationRequest>::namespaced(client.clone(), &config.registration_namespace),
		wc(),
	);
	let tenants = Controller::new(Api::<Tenant>::all(client.clone()), wc())
		.owns(Api::<Namespace>::all(client.clone()), wc());
	let users = Controller::new(Api::<User>::all(client.clone()), wc())
		.owns(Api::<Role>::all(client.clone()), wc())
		.owns(Api::<RoleBinding>::all(client.clone()), wc())
		.owns(Api::<ServiceAccount>::all(client.clone()), wc())
		.owns(Api::<Secret>::all(client), wc());

	tracing::info!(
		concurrency = config.concurrency,
		namespace = %config.registration_namespace,
		"Starting provisioning controllers"
	);

	tokio::join!(
		drive(
			registrations,
			RegistrationReconciler::new(
				Arc::clone(&store),
				config.namespace_poll_interval,
				config.template.clone(),
			),
			&config,
		),
		drive(tenants, TenantReconciler::new(Arc::clone(&store)), &config),
		drive(users, UserReconciler::new(Arc::clone(&store), config.policy.clone()), &config),
	);

	tracing::info!("Provisioning controllers stopped");
}
