// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod controller;
mod http;
mod logging;
mod notification;
mod store;

pub use controller::{ControllerConfig, ControllerConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use notification::{NotificationConfig, NotificationConfigLayer};
pub use store::{StoreBackend, StoreConfig, StoreConfigLayer};
