// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	ControllerConfigLayer, HttpConfigLayer, LoggingConfigLayer, NotificationConfigLayer,
	StoreBackend, StoreConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/atrium/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: ATRIUM_SERVER_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			store: Some(load_store_from_env()?),
			controller: Some(load_controller_from_env()?),
			notification: Some(load_notification_from_env()),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid usize value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("ATRIUM_SERVER_HOST"),
		port: env_u16("ATRIUM_SERVER_PORT")?,
	})
}

fn load_store_from_env() -> Result<StoreConfigLayer, ConfigError> {
	let backend = env_var("ATRIUM_SERVER_STORE_BACKEND")
		.map(|v| {
			v.parse::<StoreBackend>()
				.map_err(|message| ConfigError::InvalidValue {
					key: "ATRIUM_SERVER_STORE_BACKEND".to_string(),
					message,
				})
		})
		.transpose()?;

	Ok(StoreConfigLayer {
		backend,
		registration_namespace: env_var("ATRIUM_SERVER_REGISTRATION_NAMESPACE"),
	})
}

fn load_controller_from_env() -> Result<ControllerConfigLayer, ConfigError> {
	Ok(ControllerConfigLayer {
		resync_interval_secs: env_u64("ATRIUM_SERVER_RESYNC_INTERVAL_SECS")?,
		namespace_poll_ms: env_u64("ATRIUM_SERVER_NAMESPACE_POLL_MS")?,
		concurrency: env_usize("ATRIUM_SERVER_CONTROLLER_CONCURRENCY")?,
		backoff_base_ms: env_u64("ATRIUM_SERVER_BACKOFF_BASE_MS")?,
		backoff_max_secs: env_u64("ATRIUM_SERVER_BACKOFF_MAX_SECS")?,
	})
}

fn load_notification_from_env() -> NotificationConfigLayer {
	NotificationConfigLayer {
		// Set-but-empty disables notifications, so it is not filtered out.
		template_name: std::env::var("ATRIUM_SERVER_TEMPLATE_NAME").ok(),
		template_namespace: env_var("ATRIUM_SERVER_TEMPLATE_NAMESPACE"),
	}
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("ATRIUM_SERVER_LOG_LEVEL"),
	}
}
