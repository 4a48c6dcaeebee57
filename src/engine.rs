use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::aggregate::QueryTrace;
use crate::metrics::MetricsSink;
use crate::probe::Prober;
use crate::transport::{ProbeError, ProbeResult, ProbeRole, TraceConfig, WorkItem};

/// Everything one tick measured, grouped per query
#[derive(Debug)]
pub struct TickReport {
	pub traces: Vec<QueryTrace>,
	pub elapsed: Duration,
}

impl TickReport {
	pub fn probe_count(&self) -> usize {
		self.traces.iter()
			.map(|t| t.hops.len() + t.entrypoints.len())
			.sum()
	}

	pub fn failure_count(&self) -> usize {
		self.traces.iter().map(|t| t.failure_count()).sum()
	}
}

/// Expand the catalog into (query x hop) and (query x entrypoint) work items.
///
/// Hop indices follow configured chain order, so they are identical every tick.
pub fn work_items(config: &TraceConfig) -> Vec<WorkItem> {
	let mut items = Vec::with_capacity(config.probes_per_tick());
	for (query_index, query) in config.queries.iter().enumerate() {
		for (index, server) in config.chain.iter().enumerate() {
			items.push(WorkItem {
				query_index,
				query: query.clone(),
				server: server.clone(),
				role: ProbeRole::Hop { index },
			});
		}
		for server in &config.entrypoints {
			items.push(WorkItem {
				query_index,
				query: query.clone(),
				server: server.clone(),
				role: ProbeRole::Entrypoint,
			});
		}
	}
	items
}

/// Runs measurement ticks and publishes their observations
pub struct TraceEngine {
	config: Arc<TraceConfig>,
	prober: Arc<dyn Prober>,
	sink: Arc<dyn MetricsSink>,
	semaphore: Arc<Semaphore>,
}

impl TraceEngine {
	pub fn new(
		config: Arc<TraceConfig>,
		prober: Arc<dyn Prober>,
		sink: Arc<dyn MetricsSink>,
	) -> Self {
		let semaphore = Arc::new(Semaphore::new(config.max_inflight.max(1)));
		TraceEngine { config, prober, sink, semaphore }
	}

	pub fn config(&self) -> &TraceConfig {
		&self.config
	}

	/// Run one full pass over the query catalog.
	///
	/// Every probe runs as its own task behind the fan-out semaphore. The
	/// sink only sees this tick's observations once every probe has finished;
	/// dropping the returned future abandons the tick without publishing.
	pub async fn run_tick(&self) -> TickReport {
		let start = Instant::now();
		let results = self.probe_all().await;

		let mut traces: Vec<QueryTrace> = self.config.queries.iter()
			.cloned()
			.map(QueryTrace::new)
			.collect();
		for result in results {
			traces[result.item.query_index].push(result);
		}

		let chain_len = self.config.chain.len();
		for trace in &mut traces {
			trace.sort();
			self.sink.observe_all(&trace.observations(chain_len));
		}

		let report = TickReport { traces, elapsed: start.elapsed() };
		info!(
			queries = report.traces.len(),
			probes = report.probe_count(),
			failures = report.failure_count(),
			elapsed_ms = report.elapsed.as_millis() as u64,
			"probe round complete"
		);
		report
	}

	async fn probe_all(&self) -> Vec<ProbeResult> {
		let timeout = self.config.timeout;
		let mut handles: Vec<(WorkItem, JoinHandle<ProbeResult>)> = Vec::new();

		for item in work_items(&self.config) {
			let sem = self.semaphore.clone();
			let prober = self.prober.clone();
			let task_item = item.clone();

			handles.push((item, tokio::spawn(async move {
				// Acquire semaphore permit for concurrency control
				let _permit = match sem.acquire_owned().await {
					Ok(permit) => permit,
					Err(e) => {
						return ProbeResult::error(task_item, ProbeError::NotScheduled(e.to_string()));
					}
				};
				prober.probe(task_item, timeout).await
			})));
		}

		let mut results = Vec::with_capacity(handles.len());
		for (item, handle) in handles {
			match handle.await {
				Ok(result) => results.push(result),
				Err(e) => {
					// A panicking probe must not take the tick down with it
					error!(query = %item.query, server = %item.server.name, "probe task failed: {}", e);
					let reason = if e.is_panic() {
						ProbeError::Panicked
					} else {
						ProbeError::NotScheduled(e.to_string())
					};
					results.push(ProbeResult::error(item, reason));
				}
			}
		}
		results
	}
}
