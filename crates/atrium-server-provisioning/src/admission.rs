// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admission defaulting and validation.
//!
//! Each admitted kind is a variant of [`AdmissionObject`]; defaulting and
//! validation dispatch on the variant and share the [`Verdict`] result.
//! [`AdmittedStore`] applies both to every create and update that goes
//! through it, so the engine and the HTTP bridge see identical checks.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use atrium_common_resources::{
	RegistrationRequest, Tenant, TenantSpec, User, UserSpec, FOREGROUND_DELETION,
	PASSWORD_ANNOTATION, TENANT_FINALIZER,
};
use atrium_server_k8s::{
	add_finalizer, FieldFilter, K8sError, K8sResult, ObjectKey, ResourceStore, StoreObject,
	WatchStream,
};
use kube::{Resource, ResourceExt};
use regex::Regex;
use serde_json::Value;

use crate::credential::{check_policy, hash_password, is_password_hash, Plaintext};

static PERSON_NAME_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[\p{L}][\p{L}\p{M}\s'\-]*$").unwrap());
static EMAIL_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap());
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
	Create,
	Update,
}

/// Shared admission result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	Allowed,
	Rejected(String),
}

impl Verdict {
	fn from_check(result: Result<(), String>) -> Self {
		match result {
			Ok(()) => Verdict::Allowed,
			Err(reason) => Verdict::Rejected(reason),
		}
	}
}

/// Kinds that carry admission rules.
#[derive(Debug, Clone)]
pub enum AdmissionObject {
	RegistrationRequest(RegistrationRequest),
	Tenant(Tenant),
	User(User),
}

fn same_kind<K: StoreObject, T: Resource<DynamicType = ()>>() -> bool {
	K::group(&()) == T::group(&()) && K::kind(&()) == T::kind(&())
}

impl AdmissionObject {
	/// Classify a stored object; `None` for kinds without rules.
	pub fn from_object<K: StoreObject>(obj: &K) -> K8sResult<Option<Self>> {
		let value = serde_json::to_value(obj)?;
		let admitted = if same_kind::<K, RegistrationRequest>() {
			AdmissionObject::RegistrationRequest(serde_json::from_value(value)?)
		} else if same_kind::<K, Tenant>() {
			AdmissionObject::Tenant(serde_json::from_value(value)?)
		} else if same_kind::<K, User>() {
			AdmissionObject::User(serde_json::from_value(value)?)
		} else {
			return Ok(None);
		};
		Ok(Some(admitted))
	}

	pub fn into_object<K: StoreObject>(self) -> K8sResult<K> {
		let value = match self {
			AdmissionObject::RegistrationRequest(obj) => serde_json::to_value(obj)?,
			AdmissionObject::Tenant(obj) => serde_json::to_value(obj)?,
			AdmissionObject::User(obj) => serde_json::to_value(obj)?,
		};
		Ok(serde_json::from_value(value)?)
	}

	pub fn kind(&self) -> &'static str {
		match self {
			AdmissionObject::RegistrationRequest(_) => "RegistrationRequest",
			AdmissionObject::Tenant(_) => "Tenant",
			AdmissionObject::User(_) => "User",
		}
	}

	/// Apply defaults in place.
	pub fn default(&mut self, op: Operation) -> Verdict {
		if op != Operation::Create {
			return Verdict::Allowed;
		}
		match self {
			AdmissionObject::RegistrationRequest(req) => default_registration(req),
			AdmissionObject::Tenant(tenant) => {
				add_finalizer(tenant, TENANT_FINALIZER);
				Verdict::Allowed
			}
			AdmissionObject::User(user) => {
				add_finalizer(user, FOREGROUND_DELETION);
				Verdict::Allowed
			}
		}
	}
}

/// The submitted password is always plaintext: it is checked against the
/// policy and hashed, whatever it looks like.
fn default_registration(req: &mut RegistrationRequest) -> Verdict {
	let plaintext = Plaintext::new(std::mem::take(&mut req.spec.password));
	if let Err(e) = check_policy(&plaintext) {
		return Verdict::Rejected(e.to_string());
	}
	match hash_password(&plaintext) {
		Ok(hash) => req.spec.password = hash,
		Err(e) => return Verdict::Rejected(e.to_string()),
	}

	let company = req.spec.tenant.company_name.get_or_insert_with(String::new);
	if company.is_empty() {
		*company = format!("{} {}", req.spec.user.first_name, req.spec.user.last_name);
	}
	Verdict::Allowed
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
	let length = value.chars().count();
	if length < min || length > max {
		return Err(format!("{field} must be between {min} and {max} characters"));
	}
	Ok(())
}

fn check_user_spec(spec: &UserSpec) -> Result<(), String> {
	for (field, value) in [("firstName", &spec.first_name), ("lastName", &spec.last_name)] {
		check_length(field, value, 1, 125)?;
		if !PERSON_NAME_REGEX.is_match(value) {
			return Err(format!("{field} contains invalid characters"));
		}
	}
	check_length("email", &spec.email, 5, 256)?;
	if !EMAIL_REGEX.is_match(&spec.email) {
		return Err("email is not a valid address".to_string());
	}
	if let Some(phone) = &spec.phone_number {
		check_length("phoneNumber", phone, 7, 15)?;
		if !PHONE_REGEX.is_match(phone) {
			return Err("phoneNumber must be in E.164 format".to_string());
		}
	}
	Ok(())
}

fn check_tenant_spec(spec: &TenantSpec) -> Result<(), String> {
	if let Some(company) = &spec.company_name {
		check_length("companyName", company, 0, 250)?;
	}
	check_length("country", &spec.country, 1, 3)?;
	check_length("city", &spec.city, 1, 50)?;
	check_length("address", &spec.address, 1, 512)?;
	check_length("postalCode", &spec.postal_code, 1, 30)?;
	if let Some(tax) = &spec.tax_number {
		check_length("taxNumber", tax, 0, 256)?;
	}
	Ok(())
}

fn check_credential_annotation(user: &User) -> Result<(), String> {
	match user.annotations().get(PASSWORD_ANNOTATION) {
		None => Err(format!("annotation {PASSWORD_ANNOTATION} is required")),
		Some(hash) if hash.is_empty() => Err(format!("annotation {PASSWORD_ANNOTATION} is empty")),
		Some(hash) if !is_password_hash(hash) => {
			Err(format!("annotation {PASSWORD_ANNOTATION} must hold a password hash"))
		}
		Some(_) => Ok(()),
	}
}

/// Validate `new` against business rules.
pub async fn validate<S: ResourceStore>(
	store: &S,
	op: Operation,
	_old: Option<&AdmissionObject>,
	new: &AdmissionObject,
) -> K8sResult<Verdict> {
	let verdict = match (new, op) {
		(AdmissionObject::RegistrationRequest(req), Operation::Create) => {
			if let Err(reason) = check_user_spec(&req.spec.user)
				.and_then(|_| check_tenant_spec(&req.spec.tenant))
			{
				return Ok(Verdict::Rejected(reason));
			}
			let filter = FieldFilter::new().eq("spec.email", &req.spec.user.email);
			let existing = store.list::<User>(None, &filter).await?;
			if existing.is_empty() {
				Verdict::Allowed
			} else {
				Verdict::Rejected(format!(
					"a user with email {} already exists",
					req.spec.user.email
				))
			}
		}
		(AdmissionObject::RegistrationRequest(_), Operation::Update) => Verdict::Allowed,
		(AdmissionObject::Tenant(tenant), _) => Verdict::from_check(check_tenant_spec(&tenant.spec)),
		(AdmissionObject::User(user), Operation::Create) => Verdict::from_check(
			check_credential_annotation(user).and_then(|_| check_user_spec(&user.spec)),
		),
		(AdmissionObject::User(user), Operation::Update) => {
			Verdict::from_check(check_user_spec(&user.spec))
		}
	};
	Ok(verdict)
}

/// Run defaulting then validation for `obj`.
///
/// Returns the defaulted object, or `K8sError::Invalid` on rejection.
pub async fn admit<S, K>(store: &S, op: Operation, old: Option<&K>, obj: &K) -> K8sResult<K>
where
	S: ResourceStore,
	K: StoreObject,
{
	let Some(mut admitted) = AdmissionObject::from_object(obj)? else {
		return Ok(obj.clone());
	};
	let old = match old {
		Some(o) => AdmissionObject::from_object(o)?,
		None => None,
	};

	if let Verdict::Rejected(reason) = admitted.default(op) {
		return Err(rejected(&admitted, obj, reason));
	}
	if let Verdict::Rejected(reason) = validate(store, op, old.as_ref(), &admitted).await? {
		return Err(rejected(&admitted, obj, reason));
	}
	admitted.into_object()
}

fn rejected<K: ResourceExt>(admitted: &AdmissionObject, obj: &K, reason: String) -> K8sError {
	tracing::info!(kind = admitted.kind(), name = %obj.name_any(), reason = %reason, "Admission rejected");
	K8sError::Invalid {
		message: format!("{} {} rejected: {reason}", admitted.kind(), obj.name_any()),
	}
}

/// Store decorator that admits every create and update.
pub struct AdmittedStore<S> {
	inner: Arc<S>,
}

impl<S: ResourceStore> AdmittedStore<S> {
	pub fn new(inner: Arc<S>) -> Self {
		Self { inner }
	}

	pub fn inner(&self) -> &Arc<S> {
		&self.inner
	}
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for AdmittedStore<S> {
	async fn create<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		// Name collisions win over admission rejections.
		if self.inner.get_opt::<K>(&ObjectKey::of(obj)).await?.is_some() {
			return Err(K8sError::AlreadyExists {
				kind: K::kind_name(),
				name: obj.name_any(),
			});
		}
		let admitted = admit(self.inner.as_ref(), Operation::Create, None, obj).await?;
		self.inner.create(&admitted).await
	}

	async fn get<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<K> {
		self.inner.get(key).await
	}

	async fn update<K: StoreObject>(&self, obj: &K) -> K8sResult<K> {
		let old = self.inner.get_opt::<K>(&ObjectKey::of(obj)).await?;
		let admitted = admit(self.inner.as_ref(), Operation::Update, old.as_ref(), obj).await?;
		self.inner.update(&admitted).await
	}

	async fn patch_status<K: StoreObject>(&self, obj: &K, status: Value) -> K8sResult<K> {
		self.inner.patch_status(obj, status).await
	}

	async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> K8sResult<()> {
		self.inner.delete::<K>(key).await
	}

	async fn list<K: StoreObject>(
		&self,
		namespace: Option<&str>,
		filter: &FieldFilter,
	) -> K8sResult<Vec<K>> {
		self.inner.list(namespace, filter).await
	}

	async fn watch<K: StoreObject>(
		&self,
		key: &ObjectKey,
		since: Option<String>,
	) -> K8sResult<WatchStream<K>> {
		self.inner.watch(key, since).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use atrium_common_resources::RegistrationRequestSpec;
	use atrium_server_k8s::{has_finalizer, InMemoryStore};

	fn registration(email: &str, password: &str) -> RegistrationRequest {
		let mut req = RegistrationRequest::new(
			"ada",
			RegistrationRequestSpec {
				user: UserSpec {
					first_name: "Ada".into(),
					last_name: "Lovelace".into(),
					email: email.into(),
					phone_number: None,
				},
				password: password.into(),
				tenant: TenantSpec {
					country: "HU".into(),
					city: "Budapest".into(),
					address: "Addr 1".into(),
					postal_code: "1000".into(),
					..Default::default()
				},
			},
		);
		req.metadata.namespace = Some("default".into());
		req
	}

	#[tokio::test]
	async fn test_registration_is_hashed_and_defaulted() {
		let store = InMemoryStore::new();
		let req = registration("ada@example.test", "Passw0rd!");
		let admitted = admit(&store, Operation::Create, None, &req).await.unwrap();
		assert!(is_password_hash(&admitted.spec.password));
		assert_eq!(
			admitted.spec.tenant.company_name.as_deref(),
			Some("Ada Lovelace")
		);
	}

	#[tokio::test]
	async fn test_hash_shaped_password_is_checked_as_plaintext() {
		let store = Arc::new(InMemoryStore::new());
		let admitted = AdmittedStore::new(Arc::clone(&store));

		let err = admitted
			.create(&registration("ada@example.test", "$argon2id$garbage"))
			.await
			.unwrap_err();
		assert!(err.is_invalid());

		let real_hash = hash_password(&Plaintext::new("Passw0rd!")).unwrap();
		let err = admitted
			.create(&registration("ada@example.test", &real_hash))
			.await
			.unwrap_err();
		assert!(err.is_invalid());

		let stored: Vec<RegistrationRequest> =
			store.list(None, &FieldFilter::new()).await.unwrap();
		assert!(stored.is_empty());
	}

	#[tokio::test]
	async fn test_policy_compliant_password_is_always_hashed() {
		let store = Arc::new(InMemoryStore::new());
		let admitted = AdmittedStore::new(Arc::clone(&store));

		let created = admitted
			.create(&registration("ada@example.test", "$argon2id$Pw0"))
			.await
			.unwrap();
		assert_ne!(created.spec.password, "$argon2id$Pw0");
		assert!(is_password_hash(&created.spec.password));
	}

	#[tokio::test]
	async fn test_existing_name_conflicts_before_validation() {
		let store = Arc::new(InMemoryStore::new());
		let admitted = AdmittedStore::new(Arc::clone(&store));
		admitted
			.create(&registration("ada@example.test", "Passw0rd!"))
			.await
			.unwrap();

		// The pending request's user now holds the email.
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
		store.create(&user).await.unwrap();

		let err = admitted
			.create(&registration("ada@example.test", "Passw0rd!"))
			.await
			.unwrap_err();
		assert!(err.is_already_exists());

		let err = admitted
			.create(&registration("ada@example.test", "weak"))
			.await
			.unwrap_err();
		assert!(err.is_already_exists());
	}

	#[tokio::test]
	async fn test_weak_password_rejected() {
		let store = InMemoryStore::new();
		let err = admit(
			&store,
			Operation::Create,
			None,
			&registration("ada@example.test", "password"),
		)
		.await
		.unwrap_err();
		assert!(err.is_invalid());
	}

	#[tokio::test]
	async fn test_invalid_email_rejected() {
		let store = InMemoryStore::new();
		let err = admit(
			&store,
			Operation::Create,
			None,
			&registration("not-an-email", "Passw0rd!"),
		)
		.await
		.unwrap_err();
		assert!(err.to_string().contains("email"));
	}

	#[tokio::test]
	async fn test_duplicate_email_rejected() {
		let store = Arc::new(InMemoryStore::new());
		let admitted = AdmittedStore::new(Arc::clone(&store));

		let mut user = User::new(
			"existing",
			UserSpec {
				first_name: "Ada".into(),
				last_name: "Lovelace".into(),
				email: "ada@example.test".into(),
				phone_number: None,
			},
		);
		user.metadata.namespace = Some("default".into());
		user.annotations_mut().insert(
			PASSWORD_ANNOTATION.into(),
			hash_password(&Plaintext::new("Passw0rd!")).unwrap(),
		);
		admitted.create(&user).await.unwrap();

		let err = admitted
			.create(&registration("ada@example.test", "Passw0rd!"))
			.await
			.unwrap_err();
		assert!(err.to_string().contains("already exists"));
	}

	#[tokio::test]
	async fn test_user_requires_credential_annotation() {
		let store = InMemoryStore::new();
		let mut user = User::new(
			"u1",
			UserSpec {
				first_name: "Ada".into(),
				last_name: "Lovelace".into(),
				email: "ada@example.test".into(),
				phone_number: None,
			},
		);
		user.metadata.namespace = Some("default".into());
		assert!(admit(&store, Operation::Create, None, &user)
			.await
			.unwrap_err()
			.is_invalid());

		user.annotations_mut()
			.insert(PASSWORD_ANNOTATION.into(), String::new());
		assert!(admit(&store, Operation::Create, None, &user)
			.await
			.unwrap_err()
			.is_invalid());

		user.annotations_mut().insert(
			PASSWORD_ANNOTATION.into(),
			hash_password(&Plaintext::new("Passw0rd!")).unwrap(),
		);
		let admitted = admit(&store, Operation::Create, None, &user).await.unwrap();
		assert!(has_finalizer(&admitted, FOREGROUND_DELETION));
	}

	#[tokio::test]
	async fn test_user_update_without_annotation_allowed() {
		let store = InMemoryStore::new();
		let mut user = User::new(
			"u1",
			UserSpec {
				first_name: "Ada".into(),
				last_name: "Lovelace".into(),
				email: "ada@example.test".into(),
				phone_number: Some("+3612345678".into()),
			},
		);
		user.metadata.namespace = Some("default".into());
		assert!(admit(&store, Operation::Update, None, &user).await.is_ok());
	}

	#[tokio::test]
	async fn test_tenant_gets_guard_on_create_only() {
		let store = InMemoryStore::new();
		let tenant = Tenant::new(
			"t1",
			TenantSpec {
				country: "HU".into(),
				city: "Budapest".into(),
				address: "Addr 1".into(),
				postal_code: "1000".into(),
				..Default::default()
			},
		);
		let created = admit(&store, Operation::Create, None, &tenant).await.unwrap();
		assert!(has_finalizer(&created, TENANT_FINALIZER));

		let updated = admit(&store, Operation::Update, None, &tenant).await.unwrap();
		assert!(!has_finalizer(&updated, TENANT_FINALIZER));
	}

	#[tokio::test]
	async fn test_unadmitted_kinds_pass_through() {
		let store = InMemoryStore::new();
		let ns = atrium_server_k8s::Namespace::default();
		assert!(AdmissionObject::from_object(&ns).unwrap().is_none());
		assert!(admit(&store, Operation::Create, None, &ns).await.is_ok());
	}

	#[test]
	fn test_name_pattern_allows_accents_and_hyphens() {
		assert!(PERSON_NAME_REGEX.is_match("Zoë Ann-Marie O'Neil"));
		assert!(!PERSON_NAME_REGEX.is_match("-Ada"));
		assert!(!PERSON_NAME_REGEX.is_match("Ada1"));
	}
}
