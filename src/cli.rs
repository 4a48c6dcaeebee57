use std::path::PathBuf;

use clap::Parser;

/// DNS chain latency exporter
#[derive(Parser, Debug)]
#[command(name = "dns-trace-exporter", version)]
#[command(about = "Trace DNS latency across a resolver chain and export it to Prometheus")]
pub struct Cli {
	/// Path to the YAML configuration file
	#[arg(short = 'c', long = "config", env = "DNS_EXPORTER_CONFIG", default_value = "config.yaml")]
	pub config: PathBuf,

	/// Log level filter, used when RUST_LOG is not set
	#[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
	pub log_level: String,

	/// Emit logs as JSON lines
	#[arg(long = "log-json")]
	pub log_json: bool,

	/// Validate the configuration, print a summary and exit
	#[arg(long = "check-config", conflicts_with = "once")]
	pub check_config: bool,

	/// Run a single probe round, print the results and exit
	#[arg(long = "once")]
	pub once: bool,
}
