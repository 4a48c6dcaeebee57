use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::TraceEngine;

/// Drive the engine at a fixed interval until cancelled.
///
/// The first tick fires immediately. A tick that overruns the interval is
/// followed back-to-back by the next one rather than skipped. Cancellation
/// drops any tick in flight, so its probes are abandoned and nothing from it
/// reaches the sink. Returns the number of completed ticks.
pub async fn run(engine: &TraceEngine, period: Duration, cancel: CancellationToken) -> u64 {
	info!(interval_secs = period.as_secs(), "scheduler started");

	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
	let mut completed = 0u64;

	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			_ = interval.tick() => {}
		}

		let report = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				info!("shutdown requested, abandoning probe round in flight");
				break;
			}
			report = engine.run_tick() => report,
		};
		completed += 1;

		if report.elapsed > period {
			warn!(
				elapsed_ms = report.elapsed.as_millis() as u64,
				interval_ms = period.as_millis() as u64,
				"probe round overran the interval, next round starts immediately"
			);
		}
	}

	info!(ticks = completed, "scheduler stopped");
	completed
}

/// Log a warning when the configured timeout cannot fit a tick in the interval.
///
/// Returns true when the worst case fits.
pub fn check_budget(engine: &TraceEngine, period: Duration) -> bool {
	let worst = engine.config().worst_case_tick();
	if worst >= period {
		warn!(
			worst_case_ms = worst.as_millis() as u64,
			interval_ms = period.as_millis() as u64,
			probes = engine.config().probes_per_tick(),
			concurrency = engine.config().max_inflight,
			"probe timeout times fan-out waves is not below the interval; rounds may run back-to-back"
		);
		return false;
	}
	true
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	use async_trait::async_trait;
	use hickory_proto::op::ResponseCode;
	use tokio::time::Instant;

	use crate::engine::tests::{config, Script, ScriptedProber};
	use crate::metrics::tests::RecordingSink;
	use crate::probe::Prober;
	use crate::transport::{ProbeResult, WorkItem};

	fn engine(sink: Arc<RecordingSink>) -> TraceEngine {
		let prober = ScriptedProber::default().hop("a", Script::Answer(1));
		TraceEngine::new(Arc::new(config(&["a"], &[])), Arc::new(prober), sink)
	}

	/// First call takes `first`, every later call answers at once. Records
	/// when each call started, relative to `origin`.
	struct PacedAnswers {
		origin: Instant,
		first: Duration,
		starts: Mutex<Vec<Duration>>,
	}

	impl PacedAnswers {
		fn new(first: Duration) -> Self {
			PacedAnswers { origin: Instant::now(), first, starts: Mutex::new(Vec::new()) }
		}

		fn start_secs(&self) -> Vec<u64> {
			self.starts.lock().unwrap().iter().map(|d| d.as_secs()).collect()
		}
	}

	#[async_trait]
	impl Prober for PacedAnswers {
		async fn probe(&self, item: WorkItem, _timeout: Duration) -> ProbeResult {
			let delay = {
				let mut starts = self.starts.lock().unwrap();
				starts.push(self.origin.elapsed());
				if starts.len() == 1 { self.first } else { Duration::ZERO }
			};
			tokio::time::sleep(delay).await;
			ProbeResult::success(item, Duration::from_millis(1), ResponseCode::NoError)
		}
	}

	fn spawn_run(
		paced: Arc<PacedAnswers>,
		sink: Arc<RecordingSink>,
		period: Duration,
		cancel: CancellationToken,
	) -> tokio::task::JoinHandle<u64> {
		let engine = TraceEngine::new(Arc::new(config(&["a"], &[])), paced, sink);
		tokio::spawn(async move { run(&engine, period, cancel).await })
	}

	#[tokio::test(start_paused = true)]
	async fn test_ticks_at_fixed_interval() {
		let sink = Arc::new(RecordingSink::default());
		let engine = Arc::new(engine(sink.clone()));
		let cancel = CancellationToken::new();

		let task = {
			let engine = engine.clone();
			let cancel = cancel.clone();
			tokio::spawn(async move { run(&engine, Duration::from_secs(10), cancel).await })
		};

		// Ticks at 0s, 10s and 20s
		tokio::time::sleep(Duration::from_secs(25)).await;
		cancel.cancel();
		let ticks = task.await.unwrap();

		assert_eq!(ticks, 3);
		// One hop latency and one chain latency per tick
		assert_eq!(sink.take().len(), 6);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancelled_before_start_runs_nothing() {
		let sink = Arc::new(RecordingSink::default());
		let engine = engine(sink.clone());
		let cancel = CancellationToken::new();
		cancel.cancel();

		assert_eq!(run(&engine, Duration::from_secs(10), cancel).await, 0);
		assert!(sink.take().is_empty());
	}

	#[test]
	fn test_budget_check() {
		let sink = Arc::new(RecordingSink::default());
		let engine = engine(sink);
		// One probe, 2s timeout
		assert!(check_budget(&engine, Duration::from_secs(30)));
		assert!(!check_budget(&engine, Duration::from_secs(2)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cancel_mid_tick_publishes_nothing() {
		let paced = Arc::new(PacedAnswers::new(Duration::from_secs(5)));
		let sink = Arc::new(RecordingSink::default());
		let cancel = CancellationToken::new();
		let task = spawn_run(paced.clone(), sink.clone(), Duration::from_secs(10), cancel.clone());

		// The first tick is still waiting on its only hop
		tokio::time::sleep(Duration::from_secs(2)).await;
		cancel.cancel();

		assert_eq!(task.await.unwrap(), 0);
		assert_eq!(paced.start_secs(), vec![0]);
		assert!(sink.take().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_overrun_tick_followed_back_to_back() {
		let paced = Arc::new(PacedAnswers::new(Duration::from_secs(15)));
		let sink = Arc::new(RecordingSink::default());
		let cancel = CancellationToken::new();
		let task = spawn_run(paced.clone(), sink.clone(), Duration::from_secs(10), cancel.clone());

		// First tick runs 0s..15s, the missed 10s tick fires as soon as it
		// ends, and the schedule then continues from there at 25s
		tokio::time::sleep(Duration::from_secs(30)).await;
		cancel.cancel();

		assert_eq!(task.await.unwrap(), 3);
		assert_eq!(paced.start_secs(), vec![0, 15, 25]);
		assert_eq!(sink.take().len(), 6);
	}
}
