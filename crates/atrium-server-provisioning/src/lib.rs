// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tenant and user provisioning.
//!
//! A RegistrationRequest expands into a Tenant with its own Namespace, a
//! User inside that Namespace, the User's access scope and credential
//! Secret, and an optional welcome Email. Every step is a level-triggered
//! reconcile against a [`ResourceStore`](atrium_server_k8s::ResourceStore),
//! scheduled either by kube-runtime controllers or by [`ResyncRunner`].

pub mod access;
pub mod admission;
pub mod backoff;
pub mod config;
pub mod controller;
pub mod credential;
pub mod error;
pub mod notify;
pub mod provisioner;
pub mod reconcile;
pub mod registration;
pub mod runner;
pub mod tenant;
pub mod user;

pub use access::{AccessPolicy, PolicyEntry};
pub use admission::{AdmissionObject, AdmittedStore, Operation, Verdict};
pub use config::{ProvisionerConfig, TemplateRef};
pub use controller::run_controllers;
pub use credential::{CredentialError, Plaintext};
pub use error::ProvisionerError;
pub use provisioner::Provisioner;
pub use reconcile::{Outcome, Reconciler};
pub use registration::RegistrationReconciler;
pub use runner::{PassReport, ResyncRunner};
pub use tenant::TenantReconciler;
pub use user::UserReconciler;
