//! Pure mapping from one tick's probe results to metric observations.
//!
//! Three views come out of the same result set: per-hop passthrough, the
//! all-or-nothing chain sum, and entrypoint passthrough. Nothing in here does
//! I/O, so the whole mapping is testable without DNS traffic.

use std::time::Duration;

use crate::transport::{ProbeResult, ProbeRole, QuerySpec};

/// A single write destined for the metrics sink
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
	HopLatency {
		query: QuerySpec,
		hop: String,
		hop_index: usize,
		latency: Duration,
	},
	HopFailed {
		query: QuerySpec,
		hop: String,
		hop_index: usize,
	},
	ChainLatency {
		query: QuerySpec,
		latency: Duration,
	},
	/// At least one hop failed; the chain series must not be shown
	ChainIncomplete {
		query: QuerySpec,
	},
	EntrypointLatency {
		query: QuerySpec,
		entrypoint: String,
		latency: Duration,
	},
	EntrypointFailed {
		query: QuerySpec,
		entrypoint: String,
	},
}

/// All probe results of one query within one tick
#[derive(Debug, Clone)]
pub struct QueryTrace {
	pub query: QuerySpec,
	/// Hop results ordered by hop index
	pub hops: Vec<ProbeResult>,
	/// Entrypoint results in configured order
	pub entrypoints: Vec<ProbeResult>,
}

impl QueryTrace {
	pub fn new(query: QuerySpec) -> Self {
		QueryTrace { query, hops: Vec::new(), entrypoints: Vec::new() }
	}

	/// File a result under the view its role belongs to.
	pub fn push(&mut self, result: ProbeResult) {
		match result.item.role {
			ProbeRole::Hop { .. } => self.hops.push(result),
			ProbeRole::Entrypoint => self.entrypoints.push(result),
		}
	}

	/// Restore configured order after results arrived out of order.
	pub fn sort(&mut self) {
		self.hops.sort_by_key(|r| match r.item.role {
			ProbeRole::Hop { index } => index,
			ProbeRole::Entrypoint => usize::MAX,
		});
	}

	/// Sum of hop latencies, or None unless every one of `chain_len` hops succeeded.
	pub fn chain_latency(&self, chain_len: usize) -> Option<Duration> {
		if self.hops.len() != chain_len {
			return None;
		}
		self.hops.iter()
			.map(|r| if r.outcome.is_success() { r.latency } else { None })
			.sum()
	}

	pub fn failure_count(&self) -> usize {
		self.hops.iter()
			.chain(self.entrypoints.iter())
			.filter(|r| !r.outcome.is_success())
			.count()
	}

	/// Every observation this query contributes to the tick.
	pub fn observations(&self, chain_len: usize) -> Vec<Observation> {
		let mut out = per_hop(&self.hops);
		out.push(match self.chain_latency(chain_len) {
			Some(latency) => Observation::ChainLatency { query: self.query.clone(), latency },
			None => Observation::ChainIncomplete { query: self.query.clone() },
		});
		out.extend(per_entrypoint(&self.entrypoints));
		out
	}
}

/// Per-hop passthrough: a latency for each success, a failure otherwise.
pub fn per_hop(results: &[ProbeResult]) -> Vec<Observation> {
	results.iter()
		.filter_map(|r| {
			let ProbeRole::Hop { index } = r.item.role else {
				return None;
			};
			let query = r.item.query.clone();
			let hop = r.item.server.name.clone();
			Some(match (r.outcome.is_success(), r.latency) {
				(true, Some(latency)) => Observation::HopLatency {
					query, hop, hop_index: index, latency,
				},
				_ => Observation::HopFailed { query, hop, hop_index: index },
			})
		})
		.collect()
}

/// Entrypoint passthrough, independent of any hop result.
pub fn per_entrypoint(results: &[ProbeResult]) -> Vec<Observation> {
	results.iter()
		.filter(|r| r.item.role == ProbeRole::Entrypoint)
		.map(|r| {
			let query = r.item.query.clone();
			let entrypoint = r.item.server.name.clone();
			match (r.outcome.is_success(), r.latency) {
				(true, Some(latency)) => Observation::EntrypointLatency {
					query, entrypoint, latency,
				},
				_ => Observation::EntrypointFailed { query, entrypoint },
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use hickory_proto::op::ResponseCode;
	use hickory_proto::rr::RecordType;

	use crate::transport::{ProbeError, ServerSpec, WorkItem};

	fn query() -> QuerySpec {
		QuerySpec { name: "example.com".to_string(), record_type: RecordType::A }
	}

	fn item(name: &str, role: ProbeRole) -> WorkItem {
		WorkItem {
			query_index: 0,
			query: query(),
			server: ServerSpec { name: name.to_string(), addr: "10.0.0.1:53".parse().unwrap() },
			role,
		}
	}

	fn hop_ok(name: &str, index: usize, ms: u64) -> ProbeResult {
		ProbeResult::success(
			item(name, ProbeRole::Hop { index }),
			Duration::from_millis(ms),
			ResponseCode::NoError,
		)
	}

	fn hop_timeout(name: &str, index: usize) -> ProbeResult {
		ProbeResult::timeout(item(name, ProbeRole::Hop { index }))
	}

	fn trace(hops: Vec<ProbeResult>, entrypoints: Vec<ProbeResult>) -> QueryTrace {
		let mut t = QueryTrace::new(query());
		for r in hops.into_iter().chain(entrypoints) {
			t.push(r);
		}
		t.sort();
		t
	}

	#[test]
	fn test_chain_sums_all_successful_hops() {
		let t = trace(vec![hop_ok("a", 0, 10), hop_ok("b", 1, 20), hop_ok("c", 2, 15)], vec![]);
		assert_eq!(t.chain_latency(3), Some(Duration::from_millis(45)));
		let obs = t.observations(3);
		assert!(obs.contains(&Observation::ChainLatency {
			query: query(),
			latency: Duration::from_millis(45),
		}));
	}

	#[test]
	fn test_chain_absent_when_any_hop_fails() {
		let t = trace(vec![hop_ok("a", 0, 10), hop_ok("b", 1, 20), hop_timeout("c", 2)], vec![]);
		assert_eq!(t.chain_latency(3), None);

		let obs = t.observations(3);
		assert_eq!(obs, vec![
			Observation::HopLatency {
				query: query(), hop: "a".to_string(), hop_index: 0,
				latency: Duration::from_millis(10),
			},
			Observation::HopLatency {
				query: query(), hop: "b".to_string(), hop_index: 1,
				latency: Duration::from_millis(20),
			},
			Observation::HopFailed { query: query(), hop: "c".to_string(), hop_index: 2 },
			Observation::ChainIncomplete { query: query() },
		]);
	}

	#[test]
	fn test_chain_absent_when_a_hop_result_is_missing() {
		let t = trace(vec![hop_ok("a", 0, 10), hop_ok("b", 1, 20)], vec![]);
		assert_eq!(t.chain_latency(3), None);
	}

	#[test]
	fn test_hops_sorted_into_configured_order() {
		let t = trace(vec![hop_ok("c", 2, 15), hop_ok("a", 0, 10), hop_ok("b", 1, 20)], vec![]);
		let indices: Vec<usize> = per_hop(&t.hops).iter()
			.filter_map(|o| match o {
				Observation::HopLatency { hop_index, .. } => Some(*hop_index),
				_ => None,
			})
			.collect();
		assert_eq!(indices, vec![0, 1, 2]);
	}

	#[test]
	fn test_entrypoint_independent_of_hop_zero() {
		let entry = ProbeResult::success(
			item("coredns", ProbeRole::Entrypoint),
			Duration::from_millis(5),
			ResponseCode::NoError,
		);
		let t = trace(vec![hop_timeout("coredns", 0)], vec![entry]);

		let obs = t.observations(1);
		assert!(obs.contains(&Observation::EntrypointLatency {
			query: query(),
			entrypoint: "coredns".to_string(),
			latency: Duration::from_millis(5),
		}));
		assert!(obs.contains(&Observation::ChainIncomplete { query: query() }));
		assert!(obs.contains(&Observation::HopFailed {
			query: query(), hop: "coredns".to_string(), hop_index: 0,
		}));
	}

	#[test]
	fn test_entrypoint_error_becomes_failure() {
		let entry = ProbeResult::error(item("coredns", ProbeRole::Entrypoint), ProbeError::Refused);
		let t = trace(vec![hop_ok("coredns", 0, 3)], vec![entry]);
		assert_eq!(t.failure_count(), 1);
		assert_eq!(per_entrypoint(&t.entrypoints), vec![Observation::EntrypointFailed {
			query: query(),
			entrypoint: "coredns".to_string(),
		}]);
	}
}
