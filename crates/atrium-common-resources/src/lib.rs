// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Declarative object schemas for tenant provisioning.
//!
//! All kinds live in the `provisioning.atrium.dev/v1` API group. `Tenant`
//! is cluster-scoped; every other kind is namespaced.

mod email;
mod registration;
mod tenant;
mod user;

pub use email::{Email, EmailSpec, EmailStatus, EmailTemplate, EmailTemplateSpec, EmailTemplateStatus};
pub use registration::{RegistrationRequest, RegistrationRequestSpec};
pub use tenant::{Tenant, TenantSpec, TenantStatus};
pub use user::{ObjectRef, User, UserPhase, UserSpec, UserStatus};

/// API group of every custom kind.
pub const GROUP: &str = "provisioning.atrium.dev";

/// Deletion guard the Tenant holds on its scope container and on itself.
pub const TENANT_FINALIZER: &str = "provisioning.atrium.dev/tenant";

/// Transient annotation carrying a credential hash on a new User.
pub const PASSWORD_ANNOTATION: &str = "provisioning.atrium.dev/password";

/// Label linking a User to the Tenant it was provisioned for.
pub const TENANT_LABEL: &str = "provisioning.atrium.dev/tenant";

/// Store-managed guard that removes dependents before their owner.
pub const FOREGROUND_DELETION: &str = "foregroundDeletion";

atrium_server_k8s::namespaced_object!(RegistrationRequest, User, Email, EmailTemplate);
atrium_server_k8s::cluster_object!(Tenant);
