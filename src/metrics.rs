use anyhow::{anyhow, Result};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::aggregate::Observation;

/// Destination for the observations produced by each tick.
///
/// Implementations must tolerate concurrent writers and never hand errors
/// back to the engine.
pub trait MetricsSink: Send + Sync {
	fn observe(&self, observation: &Observation);

	fn observe_all(&self, observations: &[Observation]) {
		for observation in observations {
			self.observe(observation);
		}
	}
}

/// Prometheus registry holding the four exported families
pub struct PrometheusSink {
	registry: Registry,
	hop_latency: GaugeVec,
	chain_latency: GaugeVec,
	entrypoint_latency: GaugeVec,
	probe_failed: CounterVec,
}

impl PrometheusSink {
	pub fn new() -> Result<Self> {
		let hop_latency = GaugeVec::new(
			Opts::new("dns_trace_latency_seconds", "DNS query latency per hop"),
			&["query_name", "query_type", "hop", "hop_index"],
		)?;
		let chain_latency = GaugeVec::new(
			Opts::new("dns_trace_chain_latency_seconds", "Total DNS query chain latency"),
			&["query_name", "query_type"],
		)?;
		let entrypoint_latency = GaugeVec::new(
			Opts::new("dns_trace_entrypoint_latency_seconds", "DNS query entrypoint latency"),
			&["query_name", "query_type", "entrypoint"],
		)?;
		let probe_failed = CounterVec::new(
			Opts::new("dns_trace_probe_failed_total", "Total failed DNS probes per hop"),
			&["query_name", "query_type", "hop"],
		)?;

		let registry = Registry::new();
		registry.register(Box::new(hop_latency.clone()))?;
		registry.register(Box::new(chain_latency.clone()))?;
		registry.register(Box::new(entrypoint_latency.clone()))?;
		registry.register(Box::new(probe_failed.clone()))?;

		Ok(PrometheusSink {
			registry,
			hop_latency,
			chain_latency,
			entrypoint_latency,
			probe_failed,
		})
	}

	/// Content type of the text exposition format
	pub fn content_type(&self) -> String {
		TextEncoder::new().format_type().to_string()
	}

	/// Render every family in the text exposition format.
	pub fn encode(&self) -> Result<String> {
		let encoder = TextEncoder::new();
		let mut buf = Vec::new();
		encoder.encode(&self.registry.gather(), &mut buf)?;
		String::from_utf8(buf).map_err(|e| anyhow!("metrics output is not UTF-8: {}", e))
	}
}

impl MetricsSink for PrometheusSink {
	fn observe(&self, observation: &Observation) {
		match observation {
			Observation::HopLatency { query, hop, hop_index, latency } => {
				let qtype = query.type_label();
				let index = hop_index.to_string();
				self.hop_latency
					.with_label_values(&[query.name.as_str(), qtype.as_str(), hop.as_str(), index.as_str()])
					.set(latency.as_secs_f64());
			}
			Observation::HopFailed { query, hop, hop_index } => {
				let qtype = query.type_label();
				let index = hop_index.to_string();
				self.probe_failed
					.with_label_values(&[query.name.as_str(), qtype.as_str(), hop.as_str()])
					.inc();
				// A series that was never set is not an error
				let _ = self.hop_latency
					.remove_label_values(&[query.name.as_str(), qtype.as_str(), hop.as_str(), index.as_str()]);
			}
			Observation::ChainLatency { query, latency } => {
				let qtype = query.type_label();
				self.chain_latency
					.with_label_values(&[query.name.as_str(), qtype.as_str()])
					.set(latency.as_secs_f64());
			}
			Observation::ChainIncomplete { query } => {
				let qtype = query.type_label();
				let _ = self.chain_latency.remove_label_values(&[query.name.as_str(), qtype.as_str()]);
			}
			Observation::EntrypointLatency { query, entrypoint, latency } => {
				let qtype = query.type_label();
				self.entrypoint_latency
					.with_label_values(&[query.name.as_str(), qtype.as_str(), entrypoint.as_str()])
					.set(latency.as_secs_f64());
			}
			Observation::EntrypointFailed { query, entrypoint } => {
				let qtype = query.type_label();
				self.probe_failed
					.with_label_values(&[query.name.as_str(), qtype.as_str(), entrypoint.as_str()])
					.inc();
				let _ = self.entrypoint_latency
					.remove_label_values(&[query.name.as_str(), qtype.as_str(), entrypoint.as_str()]);
			}
		}
	}
}
