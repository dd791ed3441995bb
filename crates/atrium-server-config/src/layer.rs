// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial server configuration used while merging sources.

use serde::Deserialize;

use crate::sections::{
	ControllerConfigLayer, HttpConfigLayer, LoggingConfigLayer, NotificationConfigLayer,
	StoreConfigLayer,
};

/// One source's view of the configuration; every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub store: Option<StoreConfigLayer>,
	#[serde(default)]
	pub controller: Option<ControllerConfigLayer>,
	#[serde(default)]
	pub notification: Option<NotificationConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(current), Some(next)) => merge(current, next),
		(None, Some(next)) => *base = Some(next),
		(_, None) => {}
	}
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.store, other.store, StoreConfigLayer::merge);
		merge_section(&mut self.controller, other.controller, ControllerConfigLayer::merge);
		merge_section(&mut self.notification, other.notification, NotificationConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_keeps_unset_sections() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: Some("127.0.0.1".to_string()),
				port: Some(9000),
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: None,
				port: Some(9100),
			}),
			logging: Some(LoggingConfigLayer {
				level: Some("debug".to_string()),
			}),
			..Default::default()
		});

		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("127.0.0.1"));
		assert_eq!(http.port, Some(9100));
		assert_eq!(base.logging.unwrap().level.as_deref(), Some("debug"));
		assert!(base.store.is_none());
	}

	#[test]
	fn test_parse_full_file() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
[http]
port = 8181

[store]
backend = "memory"

[controller]
concurrency = 8

[notification]
template_name = ""
"#,
		)
		.unwrap();
		assert_eq!(layer.http.unwrap().port, Some(8181));
		assert_eq!(layer.controller.unwrap().concurrency, Some(8));
		assert_eq!(layer.notification.unwrap().template_name.as_deref(), Some(""));
	}
}
