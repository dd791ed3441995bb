// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential materialization.
//!
//! A registration password is hashed once at admission time and travels
//! to the User as a transient annotation. The User reconciler then moves
//! the hash into a dedicated Secret and scrubs the annotation, so the two
//! copies never coexist after a successful pass.
//!
//! Production parameters are Argon2id with:
//! - Memory: 65536 KiB (64 MiB)
//! - Iterations: 3
//! - Parallelism: 2
//! - Salt: 16 bytes, key: 32 bytes
//!
//! Test builds use minimal parameters.

use std::collections::BTreeMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use atrium_common_resources::{ObjectRef, User, PASSWORD_ANNOTATION};
use atrium_server_k8s::{ByteString, ObjectKey, ObjectMeta, ResourceStore, Secret};
use kube::ResourceExt;
use zeroize::Zeroizing;

use crate::error::ProvisionerError;
use crate::reconcile::owner_ref;

/// Key inside the credential Secret holding the hash.
pub const SECRET_KEY: &str = "password";

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
	#[error("password must be between 8 and 64 characters")]
	Length,

	#[error("password must contain at least one {0}")]
	MissingClass(&'static str),

	#[error("failed to hash password: {0}")]
	Hash(String),
}

/// Plaintext password wiped from memory on drop.
pub struct Plaintext(Zeroizing<String>);

impl Plaintext {
	pub fn new(value: impl Into<String>) -> Self {
		Self(Zeroizing::new(value.into()))
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Debug for Plaintext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("Plaintext([REDACTED])")
	}
}

fn argon2_instance() -> Result<Argon2<'static>, CredentialError> {
	#[cfg(test)]
	let params = Params::new(1024, 1, 1, Some(32));

	#[cfg(not(test))]
	let params = Params::new(64 * 1024, 3, 2, Some(32));

	let params = params.map_err(|e| CredentialError::Hash(e.to_string()))?;
	Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Enforce the password policy: 8 to 64 characters with at least one
/// ASCII uppercase letter, ASCII lowercase letter and digit, plus one
/// character outside `[A-Za-z0-9]` (whitespace counts).
pub fn check_policy(password: &Plaintext) -> Result<(), CredentialError> {
	let value = password.expose();
	let length = value.chars().count();
	if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
		return Err(CredentialError::Length);
	}
	if !value.chars().any(|c| c.is_ascii_uppercase()) {
		return Err(CredentialError::MissingClass("uppercase letter"));
	}
	if !value.chars().any(|c| c.is_ascii_lowercase()) {
		return Err(CredentialError::MissingClass("lowercase letter"));
	}
	if !value.chars().any(|c| c.is_ascii_digit()) {
		return Err(CredentialError::MissingClass("digit"));
	}
	if !value.chars().any(|c| !c.is_ascii_alphanumeric()) {
		return Err(CredentialError::MissingClass("special character"));
	}
	Ok(())
}

/// Hash a plaintext password into a PHC string.
pub fn hash_password(password: &Plaintext) -> Result<String, CredentialError> {
	let salt = SaltString::generate(&mut OsRng);
	let hash = argon2_instance()?
		.hash_password(password.expose().as_bytes(), &salt)
		.map_err(|e| CredentialError::Hash(e.to_string()))?;
	Ok(hash.to_string())
}

/// Whether a value is a complete Argon2id PHC string: it parses, names
/// `argon2id`, and carries both a salt and a hash output.
pub fn is_password_hash(value: &str) -> bool {
	PasswordHash::new(value).is_ok_and(|parsed| {
		parsed.algorithm == Algorithm::Argon2id.ident()
			&& parsed.salt.is_some()
			&& parsed.hash.is_some()
	})
}

pub fn secret_name(user: &User) -> String {
	format!("{}-password", user.name_any())
}

/// Secret holding `hash`, owned by the user.
pub fn build_secret(user: &User, hash: &str) -> Result<Secret, ProvisionerError> {
	Ok(Secret {
		metadata: ObjectMeta {
			name: Some(secret_name(user)),
			namespace: user.namespace(),
			owner_references: Some(vec![owner_ref(user)?]),
			..Default::default()
		},
		type_: Some("Opaque".to_string()),
		data: Some(BTreeMap::from([(
			SECRET_KEY.to_string(),
			ByteString(hash.as_bytes().to_vec()),
		)])),
		..Default::default()
	})
}

/// Outcome of a materialization step.
#[derive(Debug)]
pub struct Materialized {
	/// The user as stored after the step
	pub user: User,
	/// Secret reference to record in status, if a secret exists
	pub password_ref: Option<ObjectRef>,
}

/// Move a pending credential hash from the user annotation into its Secret.
///
/// The Secret is upserted first and the annotation cleared second, so a
/// crash in between leaves the annotation in place and the next pass
/// repeats the idempotent upsert.
pub async fn materialize<S: ResourceStore>(
	store: &S,
	user: User,
) -> Result<Materialized, ProvisionerError> {
	let name = secret_name(&user);

	let Some(hash) = user.pending_credential().map(str::to_string) else {
		let key = ObjectKey::namespaced(user.namespace().unwrap_or_default(), &name);
		let existing = store.get_opt::<Secret>(&key).await?;
		return Ok(Materialized {
			password_ref: existing.map(|_| ObjectRef::new(&name)),
			user,
		});
	};

	let desired = build_secret(&user, &hash)?;
	match store.create(&desired).await {
		Ok(_) => {
			tracing::info!(user = %user.name_any(), secret = %name, "Credential secret created");
		}
		Err(e) if e.is_already_exists() => {
			let key = ObjectKey::of(&desired);
			let mut current: Secret = store.get(&key).await?;
			current.data = desired.data.clone();
			current.type_ = desired.type_.clone();
			store.update(&current).await?;
			tracing::info!(user = %user.name_any(), secret = %name, "Credential secret updated");
		}
		Err(e) => return Err(e.into()),
	}

	let mut scrubbed = user;
	scrubbed.annotations_mut().remove(PASSWORD_ANNOTATION);
	let user = store.update(&scrubbed).await?;
	tracing::debug!(user = %user.name_any(), "Credential annotation cleared");

	Ok(Materialized {
		user,
		password_ref: Some(ObjectRef::new(name)),
	})
}
