use std::io::ErrorKind;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::dns::{build_query, parse_response, peek_txid};
use crate::transport::{ProbeError, ProbeOutcome, ProbeResult, WorkItem};

/// Use a 4096-byte buffer to handle EDNS-extended responses
const RECV_BUFFER_SIZE: usize = 4096;

/// Issues exactly one DNS query for a work item and classifies the outcome.
///
/// Implementations must not touch shared state so that any number of probes
/// can run concurrently without coordination.
#[async_trait]
pub trait Prober: Send + Sync {
	async fn probe(&self, item: WorkItem, timeout: Duration) -> ProbeResult;
}

/// Plain UDP prober with one dedicated socket per query
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpProber;

#[async_trait]
impl Prober for UdpProber {
	async fn probe(&self, item: WorkItem, timeout: Duration) -> ProbeResult {
		let result = send_udp_query(item, timeout).await;
		log_result(&result);
		result
	}
}

fn log_result(result: &ProbeResult) {
	let item = &result.item;
	match (&result.outcome, result.latency) {
		(ProbeOutcome::Success { rcode }, Some(latency)) => {
			debug!(
				query = %item.query, server = %item.server.name, role = %item.role,
				%rcode, latency_ms = latency.as_secs_f64() * 1000.0,
				"probe succeeded"
			);
		}
		(ProbeOutcome::Timeout, _) => {
			warn!(
				query = %item.query, server = %item.server.name,
				addr = %item.server.addr, role = %item.role,
				"probe timed out"
			);
		}
		(outcome, _) => {
			warn!(
				query = %item.query, server = %item.server.name,
				addr = %item.server.addr, role = %item.role, ?outcome,
				"probe failed"
			);
		}
	}
}

fn io_error(e: std::io::Error, wrap: fn(String) -> ProbeError) -> ProbeError {
	if e.kind() == ErrorKind::ConnectionRefused {
		ProbeError::Refused
	} else {
		wrap(e.to_string())
	}
}

/// Send a single DNS query over UDP and measure latency.
///
/// The socket is connected to the server so that ICMP port-unreachable
/// surfaces as a refused connection instead of a silent timeout. Datagrams
/// carrying a foreign transaction ID are ignored; the query is never re-sent.
async fn send_udp_query(item: WorkItem, timeout: Duration) -> ProbeResult {
	let txid: u16 = rand::random();
	let query_bytes = match build_query(&item.query, txid) {
		Ok(bytes) => bytes,
		Err(e) => return ProbeResult::error(item, ProbeError::Build(e.to_string())),
	};

	let resolver = item.server.addr;
	let bind_addr = if resolver.is_ipv4() {
		"0.0.0.0:0"
	} else {
		"[::]:0"
	};
	let socket = match UdpSocket::bind(bind_addr).await {
		Ok(s) => s,
		Err(e) => return ProbeResult::error(item, ProbeError::Socket(e.to_string())),
	};
	if let Err(e) = socket.connect(resolver).await {
		return ProbeResult::error(item, ProbeError::Socket(e.to_string()));
	}

	// Start timing immediately around send+recv
	let start = Instant::now();
	if let Err(e) = socket.send(&query_bytes).await {
		return ProbeResult::error(item, io_error(e, ProbeError::Send));
	}

	let mut buf = vec![0u8; RECV_BUFFER_SIZE];
	loop {
		let elapsed = start.elapsed();
		if elapsed >= timeout {
			return ProbeResult::timeout(item);
		}
		let remaining = timeout - elapsed;

		let len = match tokio::time::timeout(remaining, socket.recv(&mut buf)).await {
			Ok(Ok(len)) => len,
			Ok(Err(e)) => return ProbeResult::error(item, io_error(e, ProbeError::Receive)),
			Err(_) => return ProbeResult::timeout(item),
		};
		let latency = start.elapsed();

		match peek_txid(&buf[..len]) {
			Some(id) if id != txid => continue,
			Some(_) => {}
			None => {
				let reason = format!("{} byte datagram is shorter than a DNS header", len);
				return ProbeResult::error(item, ProbeError::Malformed(reason));
			}
		}

		return match parse_response(&buf[..len], txid) {
			Ok(response) => {
				trace!(
					server = %item.server.name, answers = response.answer_count,
					truncated = response.truncated, "parsed response"
				);
				ProbeResult::success(item, latency, response.rcode)
			}
			Err(e) => ProbeResult::error(item, ProbeError::Malformed(e.to_string())),
		};
	}
}
