// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Atrium server.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file
//! (`/etc/atrium/server.toml` unless overridden), and `ATRIUM_SERVER_*`
//! environment variables.
//!
//! ```ignore
//! use atrium_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub store: StoreConfig,
	pub controller: ControllerConfig,
	pub notification: NotificationConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

fn load_sources(sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	let mut sources = sources;
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only.
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	load_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Finalize a merged layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let store = layer.store.unwrap_or_default().finalize();
	let controller = layer.controller.unwrap_or_default().finalize();
	let notification = layer.notification.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_controller(&controller)?;

	info!(
		host = %http.host,
		port = http.port,
		backend = %store.backend,
		registration_namespace = %store.registration_namespace,
		concurrency = controller.concurrency,
		notifications_enabled = notification.enabled(),
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		store,
		controller,
		notification,
		logging,
	})
}

fn validate_controller(controller: &ControllerConfig) -> Result<(), ConfigError> {
	if controller.concurrency == 0 {
		return Err(ConfigError::Validation(
			"controller concurrency must be at least 1".to_string(),
		));
	}
	if controller.resync_interval_secs == 0 || controller.namespace_poll_ms == 0 {
		return Err(ConfigError::Validation(
			"resync and namespace poll intervals must be non-zero".to_string(),
		));
	}
	if controller.backoff_base() > controller.backoff_max() {
		return Err(ConfigError::Validation(format!(
			"backoff base ({}ms) exceeds backoff max ({}s)",
			controller.backoff_base_ms, controller.backoff_max_secs
		)));
	}
	Ok(())
}
