// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Atrium provisioning server.
//!
//! Hosts the synchronous registration bridge over HTTP and wires the
//! configured store backend to the provisioning reconcilers.

pub mod api;
pub mod bridge;
pub mod error;
pub mod routes;
pub mod setup;

pub use api::{create_router, AppState};
pub use atrium_server_config::ServerConfig;
pub use bridge::{FlowState, RegistrationBridge, RegistrationPayload};
pub use error::ServerError;
pub use setup::provisioner_config;
