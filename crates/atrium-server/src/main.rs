// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Atrium provisioning server binary.

use std::path::PathBuf;
use std::sync::Arc;

use atrium_server::{create_router, provisioner_config, AppState, ServerConfig};
use atrium_server_config::StoreBackend;
use atrium_server_k8s::{InMemoryStore, KubeStore, ResourceStore};
use atrium_server_provisioning::{run_controllers, AdmittedStore, Provisioner, ResyncRunner};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Atrium server - tenant provisioning over a declarative object store.
#[derive(Parser, Debug)]
#[command(name = "atrium-server", about = "Atrium tenant provisioning server", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/atrium/server.toml)
	#[arg(long, env = "ATRIUM_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

fn format_version_info() -> String {
	format!(
		"atrium-server version: {}\n\
         Platform:              {}-{}",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH,
	)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", format_version_info());
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => atrium_server_config::load_config_with_file(path)?,
		None => atrium_server_config::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		backend = %config.store.backend,
		"Starting atrium-server"
	);

	let shutdown = CancellationToken::new();
	tokio::spawn({
		let shutdown = shutdown.clone();
		async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => tracing::info!("Received shutdown signal"),
				Err(e) => {
					tracing::error!(error = %e, "Failed to listen for shutdown signal");
					return;
				}
			}
			shutdown.cancel();
		}
	});

	match config.store.backend {
		StoreBackend::Kubernetes => {
			let kube = KubeStore::new().await?;
			let client = kube.client();
			let store = Arc::new(AdmittedStore::new(Arc::new(kube)));
			let controllers = tokio::spawn(run_controllers(
				client,
				Arc::clone(&store),
				provisioner_config(&config),
			));
			serve(&config, store, shutdown, controllers).await?;
		}
		StoreBackend::Memory => {
			tracing::warn!("Using the in-memory store; all objects are lost on exit");
			let store = Arc::new(AdmittedStore::new(Arc::new(InMemoryStore::new())));
			let provisioner_config = provisioner_config(&config);
			let tick = provisioner_config.namespace_poll_interval;
			let runner = ResyncRunner::new(Provisioner::new(Arc::clone(&store), provisioner_config), tick);
			let reconcilers = tokio::spawn({
				let shutdown = shutdown.clone();
				async move { runner.run(shutdown).await }
			});
			serve(&config, store, shutdown, reconcilers).await?;
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}

async fn serve<S: ResourceStore>(
	config: &ServerConfig,
	store: Arc<S>,
	shutdown: CancellationToken,
	reconcilers: JoinHandle<()>,
) -> Result<(), Box<dyn std::error::Error>> {
	let state = AppState::new(
		store,
		config.store.registration_namespace.clone(),
		shutdown.clone(),
	);
	let app = create_router(state);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	let result = axum::serve(listener, app)
		.with_graceful_shutdown(shutdown.clone().cancelled_owned())
		.await;
	if let Err(e) = &result {
		tracing::error!(error = %e, "Server error");
		// Controllers only stop on a signal.
		reconcilers.abort();
	}

	shutdown.cancel();
	tracing::info!("Waiting for reconcilers to stop");
	match reconcilers.await {
		Err(e) if !e.is_cancelled() => tracing::error!(error = %e, "Reconciler task failed"),
		_ => {}
	}

	result.map_err(Into::into)
}
