// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session probe endpoints. Both are stateless and always succeed.

use axum::Json;
use serde_json::{json, Value};

/// GET /login
pub async fn login() -> Json<Value> {
	Json(json!({}))
}

/// GET /verify
pub async fn verify() -> Json<Value> {
	Json(json!({}))
}
