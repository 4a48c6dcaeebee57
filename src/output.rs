use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use crate::aggregate::QueryTrace;
use crate::config::Config;
use crate::engine::TickReport;
use crate::transport::{ProbeOutcome, ProbeResult, ProbeRole};

fn format_ms(latency: std::time::Duration) -> String {
	format!("{:.1} ms", latency.as_secs_f64() * 1000.0)
}

fn format_result(result: &ProbeResult) -> String {
	match (&result.outcome, result.latency) {
		(ProbeOutcome::Success { rcode }, Some(latency)) => {
			format!("{} ({})", format_ms(latency), rcode)
		}
		(ProbeOutcome::Timeout, _) => "timeout".to_string(),
		(ProbeOutcome::Error(e), _) => format!("error: {}", e),
		(ProbeOutcome::Success { .. }, None) => "no latency".to_string(),
	}
}

/// Print a summary of the loaded configuration.
pub fn print_config_summary(config: &Config) {
	let trace = &config.trace;
	println!("DNS Trace Configuration");
	println!("=======================");
	println!("Interval:       {} s", config.interval.as_secs());
	println!("Listen port:    {}", config.listen_port);
	println!("Timeout:        {} ms", trace.timeout.as_millis());
	println!("Concurrency:    {}", trace.max_inflight);
	println!("Chain:          {} hops", trace.chain.len());
	for (i, s) in trace.chain.iter().enumerate() {
		println!("  [{}] {} ({})", i, s.name, s.addr);
	}
	println!("Entrypoints:    {}", trace.entrypoints.len());
	for s in &trace.entrypoints {
		println!("  - {} ({})", s.name, s.addr);
	}
	println!("Queries:        {}", trace.queries.len());
	for q in &trace.queries {
		println!("  - {}", q);
	}
	println!(
		"Worst case:     {} ms per round ({} probes)",
		trace.worst_case_tick().as_millis(), trace.probes_per_tick(),
	);
	println!();
}

fn trace_table(trace: &QueryTrace, chain_len: usize) -> Table {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["View", "Server", "Address", "Result"]);

	for r in &trace.hops {
		let view = match r.item.role {
			ProbeRole::Hop { index } => format!("hop {}", index),
			ProbeRole::Entrypoint => "entrypoint".to_string(),
		};
		table.add_row(vec![
			view,
			r.item.server.name.clone(),
			r.item.server.addr.to_string(),
			format_result(r),
		]);
	}
	let chain = match trace.chain_latency(chain_len) {
		Some(total) => format_ms(total),
		None => "incomplete".to_string(),
	};
	table.add_row(vec!["chain".to_string(), String::new(), String::new(), chain]);
	for r in &trace.entrypoints {
		table.add_row(vec![
			"entrypoint".to_string(),
			r.item.server.name.clone(),
			r.item.server.addr.to_string(),
			format_result(r),
		]);
	}
	table
}

/// Print one table per query for a completed probe round.
pub fn print_tick_report(report: &TickReport, chain_len: usize) {
	println!("\nProbe Round Results");
	println!("===================");
	for trace in &report.traces {
		println!("\n{}", trace.query);
		println!("{}", trace_table(trace, chain_len));
	}
	println!(
		"\n{} probes, {} failed, {} ms",
		report.probe_count(), report.failure_count(), report.elapsed.as_millis(),
	);
}
