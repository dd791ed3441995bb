// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use atrium_common_resources::{RegistrationRequest, Tenant, User, UserSpec};
use atrium_server::{create_router, AppState};
use atrium_server_k8s::{FieldFilter, InMemoryStore, ObjectKey, ResourceStore};
use atrium_server_provisioning::{AdmittedStore, Provisioner, ProvisionerConfig, ResyncRunner};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const ADA_JSON: &str = r#"{
	"spec": {
		"user": {"firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.test"},
		"password": "Passw0rd!",
		"tenant": {"country": "HU", "city": "Budapest", "address": "Addr 1", "postalCode": "1000"}
	}
}"#;

const ADA_YAML: &str = "
spec:
  user:
    firstName: Ada
    lastName: Lovelace
    email: ada@example.test
  password: Passw0rd!
  tenant:
    country: HU
    city: Budapest
    address: Addr 1
    postalCode: '1000'
";

struct TestServer {
	raw: Arc<InMemoryStore>,
	app: Router,
	shutdown: CancellationToken,
}

impl TestServer {
	/// Without reconcilers, registrations never complete.
	fn idle() -> Self {
		let raw = Arc::new(InMemoryStore::new());
		let store = Arc::new(AdmittedStore::new(Arc::clone(&raw)));
		let shutdown = CancellationToken::new();
		let app = create_router(AppState::new(store, "default", shutdown.clone()));
		Self { raw, app, shutdown }
	}

	/// With a resync runner driving the reconcilers.
	fn provisioning() -> Self {
		let server = Self::idle();
		let store = Arc::new(AdmittedStore::new(Arc::clone(&server.raw)));
		let runner = ResyncRunner::new(
			Provisioner::new(
				store,
				ProvisionerConfig {
					namespace_poll_interval: Duration::from_millis(10),
					template: None,
					..Default::default()
				},
			),
			Duration::from_millis(10),
		);
		let shutdown = server.shutdown.clone();
		tokio::spawn(async move { runner.run(shutdown).await });
		server
	}

	async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
		let response = self.app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		(status, body.to_vec())
	}

	async fn wait_for_request(&self, name: &str) {
		let key = ObjectKey::namespaced("default", name);
		for _ in 0..2000 {
			if self
				.raw
				.get_opt::<RegistrationRequest>(&key)
				.await
				.unwrap()
				.is_some()
			{
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("registration {name} was never submitted");
	}

	async fn wait_for_watches(&self, count: usize) {
		for _ in 0..2000 {
			if self.raw.active_watches() == count {
				return;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("expected {count} active watches, found {}", self.raw.active_watches());
	}
}

impl Drop for TestServer {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

fn post(id: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
	let mut builder = Request::builder()
		.method("POST")
		.uri(format!("/registrations/{id}"));
	if let Some(content_type) = content_type {
		builder = builder.header(header::CONTENT_TYPE, content_type);
	}
	builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn registration_returns_created_after_expansion() {
	let server = TestServer::provisioning();

	let (status, body) = tokio::time::timeout(
		Duration::from_secs(30),
		server.send(post("ada", Some("application/json"), ADA_JSON)),
	)
	.await
	.unwrap();
	assert_eq!(status, StatusCode::CREATED);
	assert!(body.is_empty());

	let requests: Vec<RegistrationRequest> =
		server.raw.list(None, &FieldFilter::new()).await.unwrap();
	assert!(requests.is_empty());
	let tenants: Vec<Tenant> = server.raw.list(None, &FieldFilter::new()).await.unwrap();
	assert_eq!(tenants.len(), 1);
	let users: Vec<User> = server.raw.list(None, &FieldFilter::new()).await.unwrap();
	assert_eq!(users.len(), 1);
	assert_eq!(server.raw.active_watches(), 0);
}

#[tokio::test]
async fn yaml_is_the_default_format() {
	let server = TestServer::provisioning();

	let (status, _) = tokio::time::timeout(
		Duration::from_secs(30),
		server.send(post("ada", None, ADA_YAML)),
	)
	.await
	.unwrap();
	assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn duplicate_registration_conflicts_while_first_is_pending() {
	let server = TestServer::idle();

	let first = tokio::spawn({
		let app = server.app.clone();
		async move { app.oneshot(post("ada", Some("application/json"), ADA_JSON)).await }
	});
	server.wait_for_request("ada").await;

	let (status, body) = server
		.send(post("ada", Some("application/json"), ADA_JSON))
		.await;
	assert_eq!(status, StatusCode::CONFLICT);
	let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(error["error"], "conflict");

	// Client disconnect: the pending call is dropped and its watch released.
	server.wait_for_watches(1).await;
	first.abort();
	let _ = first.await;
	assert_eq!(server.raw.active_watches(), 0);

	// The request object is left behind for the reconciler.
	let pending: Vec<RegistrationRequest> =
		server.raw.list(None, &FieldFilter::new()).await.unwrap();
	assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn duplicate_registration_conflicts_after_user_exists() {
	let server = TestServer::idle();

	let first = tokio::spawn({
		let app = server.app.clone();
		async move { app.oneshot(post("ada", Some("application/json"), ADA_JSON)).await }
	});
	server.wait_for_request("ada").await;

	// Expansion got as far as the User, then stalled.
	let mut user = User::new(
		"ada",
		UserSpec {
			first_name: "Ada".into(),
			last_name: "Lovelace".into(),
			email: "ada@example.test".into(),
			phone_number: None,
		},
	);
	user.metadata.namespace = Some("default".into());
	server.raw.create(&user).await.unwrap();

	let (status, body) = server
		.send(post("ada", Some("application/json"), ADA_JSON))
		.await;
	assert_eq!(status, StatusCode::CONFLICT);
	let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(error["error"], "conflict");

	first.abort();
	let _ = first.await;
}

#[tokio::test]
async fn dotted_id_is_accepted() {
	let server = TestServer::idle();

	let pending = tokio::spawn({
		let app = server.app.clone();
		async move {
			app.oneshot(post("ada.lovelace", Some("application/json"), ADA_JSON))
				.await
		}
	});
	server.wait_for_request("ada.lovelace").await;
	pending.abort();
	let _ = pending.await;
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
	let server = TestServer::idle();

	let (status, body) = server
		.send(post("ada", Some("application/json"), "{not json"))
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(error["error"], "bad_request");

	let (status, _) = server.send(post("ada", None, "spec: [1, 2")).await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(server.raw.active_watches(), 0);
}

#[tokio::test]
async fn weak_password_is_rejected_at_admission() {
	let server = TestServer::idle();

	let weak = ADA_JSON.replace("Passw0rd!", "password");
	let (status, _) = server
		.send(post("ada", Some("application/json"), &weak))
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);

	let requests: Vec<RegistrationRequest> =
		server.raw.list(None, &FieldFilter::new()).await.unwrap();
	assert!(requests.is_empty());
}

#[tokio::test]
async fn invalid_id_is_bad_request() {
	let server = TestServer::idle();
	let (status, _) = server
		.send(post("Ada_Lovelace", Some("application/json"), ADA_JSON))
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shutdown_abandons_pending_registration() {
	let server = TestServer::idle();

	let pending = tokio::spawn({
		let app = server.app.clone();
		async move {
			app.oneshot(post("ada", Some("application/json"), ADA_JSON))
				.await
				.unwrap()
				.status()
		}
	});
	server.wait_for_watches(1).await;
	server.shutdown.cancel();

	let status = tokio::time::timeout(Duration::from_secs(5), pending)
		.await
		.unwrap()
		.unwrap();
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(server.raw.active_watches(), 0);
}

#[tokio::test]
async fn probe_endpoints_return_empty_objects() {
	let server = TestServer::idle();

	for uri in ["/login", "/verify"] {
		let (status, body) = server.send(get(uri)).await;
		assert_eq!(status, StatusCode::OK);
		let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(value, serde_json::json!({}));
	}

	let (status, body) = server.send(get("/health")).await;
	assert_eq!(status, StatusCode::OK);
	let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(value["status"], "ok");
}
