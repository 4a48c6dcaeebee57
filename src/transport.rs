use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

/// A named DNS server, either a chain hop or an entrypoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
	pub name: String,
	pub addr: SocketAddr,
}

/// A (name, record type) pair from the query catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
	pub name: String,
	pub record_type: RecordType,
}

impl QuerySpec {
	/// Record type mnemonic used as the `query_type` label
	pub fn type_label(&self) -> String {
		self.record_type.to_string()
	}
}

impl fmt::Display for QuerySpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.name, self.record_type)
	}
}

/// Which view a probe feeds: a chain hop at a fixed position, or an entrypoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeRole {
	Hop { index: usize },
	Entrypoint,
}

impl fmt::Display for ProbeRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProbeRole::Hop { index } => write!(f, "hop[{}]", index),
			ProbeRole::Entrypoint => write!(f, "entrypoint"),
		}
	}
}

/// One unit of work inside a tick: a query against a server in a given role
#[derive(Debug, Clone)]
pub struct WorkItem {
	/// Position of the query in the catalog
	pub query_index: usize,
	pub query: QuerySpec,
	pub server: ServerSpec,
	pub role: ProbeRole,
}

/// Transport-level reasons a probe produced no usable response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
	#[error("failed to build query: {0}")]
	Build(String),
	#[error("failed to open socket: {0}")]
	Socket(String),
	#[error("failed to send query: {0}")]
	Send(String),
	#[error("connection refused")]
	Refused,
	#[error("failed to receive response: {0}")]
	Receive(String),
	#[error("malformed response: {0}")]
	Malformed(String),
	#[error("probe task panicked")]
	Panicked,
	#[error("probe was not scheduled: {0}")]
	NotScheduled(String),
}

/// Classification of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
	/// A response arrived in time, whatever its response code
	Success { rcode: ResponseCode },
	Timeout,
	Error(ProbeError),
}

impl ProbeOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, ProbeOutcome::Success { .. })
	}
}

/// Result of a single probe; lives only for the tick that produced it
#[derive(Debug, Clone)]
pub struct ProbeResult {
	pub item: WorkItem,
	/// Present only when the outcome is `Success`
	pub latency: Option<Duration>,
	pub outcome: ProbeOutcome,
}

impl ProbeResult {
	pub fn success(item: WorkItem, latency: Duration, rcode: ResponseCode) -> Self {
		ProbeResult {
			item,
			latency: Some(latency),
			outcome: ProbeOutcome::Success { rcode },
		}
	}

	pub fn timeout(item: WorkItem) -> Self {
		ProbeResult { item, latency: None, outcome: ProbeOutcome::Timeout }
	}

	pub fn error(item: WorkItem, error: ProbeError) -> Self {
		ProbeResult { item, latency: None, outcome: ProbeOutcome::Error(error) }
	}
}

/// Everything the trace engine needs for one tick, fixed at startup
#[derive(Debug, Clone)]
pub struct TraceConfig {
	/// The chain, in hop order
	pub chain: Vec<ServerSpec>,
	pub entrypoints: Vec<ServerSpec>,
	pub queries: Vec<QuerySpec>,
	/// Per-probe timeout
	pub timeout: Duration,
	/// Maximum probes in flight at once
	pub max_inflight: usize,
}

impl TraceConfig {
	/// Number of probes issued per tick
	pub fn probes_per_tick(&self) -> usize {
		self.queries.len() * (self.chain.len() + self.entrypoints.len())
	}

	/// Upper bound on a tick's duration given the fan-out limit
	pub fn worst_case_tick(&self) -> Duration {
		let waves = self.probes_per_tick().div_ceil(self.max_inflight.max(1));
		self.timeout * waves as u32
	}
}
