// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Welcome notification glue.
//!
//! Templates use `{placeholder}` substitution. Delivery of the resulting
//! Email object is handled outside this process.

use std::collections::HashMap;

use atrium_common_resources::{Email, EmailSpec, EmailTemplate, User};
use atrium_server_k8s::{ObjectKey, ResourceStore};
use kube::ResourceExt;

use crate::config::TemplateRef;
use crate::error::ProvisionerError;
use crate::reconcile::{get_or_create, owner_ref};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
	#[error("unknown placeholder {{{0}}}")]
	UnknownPlaceholder(String),

	#[error("unterminated placeholder at byte {0}")]
	Unterminated(usize),
}

/// Values a template may reference.
pub fn user_fields(user: &User) -> HashMap<&'static str, String> {
	HashMap::from([
		("name", user.name_any()),
		("namespace", user.namespace().unwrap_or_default()),
		("firstName", user.spec.first_name.clone()),
		("lastName", user.spec.last_name.clone()),
		("email", user.spec.email.clone()),
		(
			"phoneNumber",
			user.spec.phone_number.clone().unwrap_or_default(),
		),
	])
}

/// Substitute `{key}` placeholders. `{{` and `}}` are literal braces.
pub fn render(template: &str, fields: &HashMap<&'static str, String>) -> Result<String, RenderError> {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	let mut offset = 0;

	while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
		out.push_str(&rest[..pos]);
		let tail = &rest[pos..];

		if tail.starts_with("{{") || tail.starts_with("}}") {
			out.push_str(&tail[..1]);
			rest = &tail[2..];
			offset += pos + 2;
			continue;
		}
		if tail.starts_with('}') {
			out.push('}');
			rest = &tail[1..];
			offset += pos + 1;
			continue;
		}

		let Some(end) = tail.find('}') else {
			return Err(RenderError::Unterminated(offset + pos));
		};
		let key = &tail[1..end];
		let value = fields
			.get(key)
			.ok_or_else(|| RenderError::UnknownPlaceholder(key.to_string()))?;
		out.push_str(value);
		rest = &tail[end + 1..];
		offset += pos + end + 1;
	}

	out.push_str(rest);
	Ok(out)
}

pub fn email_name(user: &User) -> String {
	format!("{}-welcome", user.name_any())
}

/// Render the welcome message for `user` and create its Email object.
///
/// A missing template disables the notification; a template that fails
/// to render is an error so the invocation is retried.
pub async fn send_welcome<S: ResourceStore>(
	store: &S,
	template_ref: &TemplateRef,
	user: &User,
) -> Result<Option<Email>, ProvisionerError> {
	let key = ObjectKey::namespaced(&template_ref.namespace, &template_ref.name);
	let Some(template) = store.get_opt::<EmailTemplate>(&key).await? else {
		tracing::debug!(template = %key, "Welcome template not found, skipping notification");
		return Ok(None);
	};

	let fields = user_fields(user);
	let render_field = |text: &str| {
		render(text, &fields).map_err(|source| ProvisionerError::Template {
			template: key.to_string(),
			source,
		})
	};

	let mut email = Email::new(
		&email_name(user),
		EmailSpec {
			to_address: user.spec.email.clone(),
			from_name: template.spec.from_name.clone(),
			from_address: template.spec.from_address.clone(),
			subject: render_field(&template.spec.subject)?,
			body: render_field(&template.spec.body)?,
		},
	);
	email.metadata.namespace = user.namespace();
	email.metadata.owner_references = Some(vec![owner_ref(user)?]);

	let email = get_or_create(store, &email).await?;
	tracing::info!(user = %user.name_any(), email = %email.name_any(), "Welcome notification queued");
	Ok(Some(email))
}

#[cfg(test)]
mod tests {
	use super::*;
	use atrium_common_resources::UserSpec;
	use proptest::prelude::*;

	fn fields() -> HashMap<&'static str, String> {
		HashMap::from([("firstName", "Ada".to_string()), ("email", "ada@example.test".to_string())])
	}

	#[test]
	fn test_render_substitutes() {
		let out = render("Hello {firstName}, we wrote to {email}.", &fields()).unwrap();
		assert_eq!(out, "Hello Ada, we wrote to ada@example.test.");
	}

	#[test]
	fn test_render_escaped_braces() {
		let out = render("{{literal}} {firstName}", &fields()).unwrap();
		assert_eq!(out, "{literal} Ada");
	}

	#[test]
	fn test_render_unknown_placeholder_fails() {
		assert_eq!(
			render("Hi {nickname}", &fields()),
			Err(RenderError::UnknownPlaceholder("nickname".into()))
		);
	}

	#[test]
	fn test_render_unterminated_fails() {
		assert_eq!(
			render("Hi {firstName", &fields()),
			Err(RenderError::Unterminated(3))
		);
	}

	#[test]
	fn test_user_fields() {
		let user = User::new(
			"u1",
			UserSpec {
				first_name: "Ada".into(),
				last_name: "Lovelace".into(),
				email: "ada@example.test".into(),
				phone_number: None,
			},
		);
		let f = user_fields(&user);
		assert_eq!(f["lastName"], "Lovelace");
		assert_eq!(f["phoneNumber"], "");
	}

	proptest! {
		#[test]
		fn prop_text_without_braces_is_unchanged(text in "[^{}]*") {
			prop_assert_eq!(render(&text, &fields()).unwrap(), text);
		}
	}
}
