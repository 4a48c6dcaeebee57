//! YAML configuration loading and validation.
//!
//! The file is read once at startup. Structural problems (invalid YAML, a
//! missing `name`) fail the parse; semantic problems are all collected and
//! reported together so a broken file can be fixed in one pass.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::rr::{Name, RecordType};
use serde::Deserialize;
use tracing::{info, warn};

use crate::resolver::parse_server;
use crate::transport::{QuerySpec, ServerSpec, TraceConfig};

pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_LISTEN_PORT: u16 = 9115;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("failed to parse config: {0}")]
	Parse(#[from] serde_yaml::Error),
	#[error("config validation failed:\n  - {}", .0.join("\n  - "))]
	Invalid(Vec<String>),
}

/// Configuration file as written, before validation
#[derive(Debug, Deserialize)]
struct RawConfig {
	interval: Option<u64>,
	listen_port: Option<u16>,
	timeout_ms: Option<u64>,
	concurrency: Option<usize>,
	servers: Option<Vec<RawServer>>,
	#[serde(default)]
	entrypoints: Vec<RawServer>,
	queries: Option<Vec<RawQuery>>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
	name: String,
	address: String,
}

#[derive(Debug, Deserialize)]
struct RawQuery {
	name: String,
	#[serde(rename = "type")]
	record_type: String,
}

/// Validated, immutable process configuration
#[derive(Debug, Clone)]
pub struct Config {
	pub interval: Duration,
	pub listen_port: u16,
	pub trace: TraceConfig,
}

impl Config {
	/// Load and validate configuration from a YAML file at `path`.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
		let config = Self::from_yaml(&content)?;
		info!(
			path = %path.display(),
			hops = config.trace.chain.len(),
			entrypoints = config.trace.entrypoints.len(),
			queries = config.trace.queries.len(),
			"loaded config"
		);
		Ok(config)
	}

	/// Parse and validate configuration from YAML text.
	pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
		let raw: RawConfig = serde_yaml::from_str(content)?;
		validate(raw)
	}

	/// Log non-fatal issues worth an operator's attention.
	pub fn warn_suspicious(&self) {
		let chain_names: HashSet<&str> = self.trace.chain.iter()
			.map(|s| s.name.as_str())
			.collect();
		for entry in &self.trace.entrypoints {
			if !chain_names.contains(entry.name.as_str()) {
				warn!(entrypoint = %entry.name, "entrypoint does not name any configured server");
			}
		}

		let mut seen = HashSet::new();
		for query in &self.trace.queries {
			if !seen.insert((query.name.to_ascii_lowercase(), query.record_type)) {
				warn!(%query, "duplicate query; it will be probed once per occurrence");
			}
		}
	}
}

fn validate(raw: RawConfig) -> Result<Config, ConfigError> {
	let mut errors = Vec::new();

	let interval = raw.interval.unwrap_or(DEFAULT_INTERVAL_SECS);
	if interval == 0 {
		errors.push("'interval' must be greater than 0".to_string());
	}
	let listen_port = raw.listen_port.unwrap_or(DEFAULT_LISTEN_PORT);
	if listen_port == 0 {
		errors.push("'listen_port' must be between 1 and 65535".to_string());
	}
	let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
	if timeout_ms == 0 {
		errors.push("'timeout_ms' must be greater than 0".to_string());
	}

	let chain = match raw.servers {
		None => {
			errors.push("missing required field: 'servers'".to_string());
			Vec::new()
		}
		Some(servers) if servers.is_empty() => {
			errors.push("'servers' must be a non-empty list".to_string());
			Vec::new()
		}
		Some(servers) => validate_servers("servers", &servers, &mut errors),
	};
	let entrypoints = validate_servers("entrypoints", &raw.entrypoints, &mut errors);

	let queries = match raw.queries {
		None => {
			errors.push("missing required field: 'queries'".to_string());
			Vec::new()
		}
		Some(queries) if queries.is_empty() => {
			errors.push("'queries' must be a non-empty list".to_string());
			Vec::new()
		}
		Some(queries) => validate_queries(&queries, &mut errors),
	};

	let probes_per_tick = queries.len() * (chain.len() + entrypoints.len());
	let max_inflight = match raw.concurrency {
		Some(0) => {
			errors.push("'concurrency' must be greater than 0".to_string());
			0
		}
		Some(n) => n,
		None => probes_per_tick.max(4),
	};

	if !errors.is_empty() {
		return Err(ConfigError::Invalid(errors));
	}

	Ok(Config {
		interval: Duration::from_secs(interval),
		listen_port,
		trace: TraceConfig {
			chain,
			entrypoints,
			queries,
			timeout: Duration::from_millis(timeout_ms),
			max_inflight,
		},
	})
}

fn validate_servers(field: &str, raw: &[RawServer], errors: &mut Vec<String>) -> Vec<ServerSpec> {
	let mut names = HashSet::new();
	let mut servers = Vec::with_capacity(raw.len());
	for (i, entry) in raw.iter().enumerate() {
		match parse_server(&entry.name, &entry.address) {
			Ok(server) => {
				if !names.insert(server.name.clone()) {
					errors.push(format!("{}[{}] duplicate name '{}'", field, i, server.name));
				}
				servers.push(server);
			}
			Err(e) => errors.push(format!("{}[{}]: {}", field, i, e)),
		}
	}
	servers
}

fn validate_queries(raw: &[RawQuery], errors: &mut Vec<String>) -> Vec<QuerySpec> {
	let mut queries = Vec::with_capacity(raw.len());
	for (i, entry) in raw.iter().enumerate() {
		let name = entry.name.trim();
		if name.is_empty() {
			errors.push(format!("queries[{}] has an empty name", i));
			continue;
		}
		if let Err(e) = Name::from_ascii(name) {
			errors.push(format!("queries[{}] invalid domain name '{}': {}", i, name, e));
			continue;
		}
		let record_type = match RecordType::from_str(&entry.record_type.trim().to_ascii_uppercase()) {
			// Unknown(_) means the mnemonic was not recognised
			Ok(RecordType::Unknown(_)) | Err(_) => {
				errors.push(format!("queries[{}] unknown record type '{}'", i, entry.record_type));
				continue;
			}
			Ok(t) => t,
		};
		queries.push(QuerySpec { name: name.to_string(), record_type });
	}
	queries
}
