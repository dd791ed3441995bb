// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Router and shared handler state.

use std::sync::Arc;

use atrium_server_k8s::ResourceStore;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::bridge::RegistrationBridge;
use crate::routes;

/// State shared by all handlers.
pub struct AppState<S> {
	pub bridge: Arc<RegistrationBridge<S>>,
}

impl<S> Clone for AppState<S> {
	fn clone(&self) -> Self {
		Self {
			bridge: Arc::clone(&self.bridge),
		}
	}
}

impl<S: ResourceStore> AppState<S> {
	/// `shutdown` abandons in-flight registrations with 503.
	pub fn new(
		store: Arc<S>,
		registration_namespace: impl Into<String>,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			bridge: Arc::new(RegistrationBridge::new(store, registration_namespace, shutdown)),
		}
	}
}

/// Build the HTTP router.
pub fn create_router<S: ResourceStore>(state: AppState<S>) -> Router {
	Router::new()
		.route("/registrations/{id}", post(routes::registrations::register::<S>))
		.route("/login", get(routes::users::login))
		.route("/verify", get(routes::users::verify))
		.route("/health", get(routes::health::health_check))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
