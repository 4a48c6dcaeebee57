mod aggregate;
mod cli;
mod config;
mod dns;
mod engine;
mod metrics;
mod output;
mod probe;
mod resolver;
mod scheduler;
mod server;
mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::Config;
use crate::engine::TraceEngine;
use crate::metrics::PrometheusSink;
use crate::probe::UdpProber;

fn init_tracing(cli: &Cli) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
	let builder = tracing_subscriber::fmt().with_env_filter(filter);
	if cli.log_json {
		builder.json().init();
	} else {
		builder.init();
	}
}

/// Resolve on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!("failed to listen for ctrl-c: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			}
			Err(e) => {
				error!("failed to listen for SIGTERM: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(&cli);

	// Configuration errors are fatal; nothing starts on a partial config
	let config = Config::load(&cli.config)
		.with_context(|| format!("invalid configuration in {}", cli.config.display()))?;
	config.warn_suspicious();

	if cli.check_config {
		output::print_config_summary(&config);
		return Ok(());
	}

	let sink = Arc::new(PrometheusSink::new()?);
	let engine = TraceEngine::new(
		Arc::new(config.trace.clone()),
		Arc::new(UdpProber),
		sink.clone(),
	);
	scheduler::check_budget(&engine, config.interval);

	if cli.once {
		let report = engine.run_tick().await;
		output::print_tick_report(&report, config.trace.chain.len());
		return Ok(());
	}

	// Bind before probing so a taken port fails startup
	let listener = server::bind(config.listen_port).await?;
	let cancel = CancellationToken::new();

	let server_task = tokio::spawn(server::serve(listener, sink, cancel.clone()));

	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			shutdown_signal().await;
			info!("shutdown signal received");
			cancel.cancel();
		});
	}

	scheduler::run(&engine, config.interval, cancel.clone()).await;

	// The scheduler only returns once cancelled; wait for the listener to close
	cancel.cancel();
	server_task.await.context("metrics server task failed")??;
	info!("exporter stopped");
	Ok(())
}
