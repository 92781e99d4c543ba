use async_trait::async_trait;
use gateway_core::model::{AccessLog, BackendTraceLog, LogConfig, LogFormat, StatusClass};

use crate::error::LogError;
use crate::sinks::LogSink;

/// Writes to stdout as ANSI-coloured text, JSON, or CSV per `logFormat`.
pub struct ConsoleSink {
	format: LogFormat,
}

impl ConsoleSink {
	pub fn new(config: &LogConfig) -> Self {
		Self { format: config.log_format }
	}

	fn render(&self, log: &AccessLog) -> String {
		match self.format {
			LogFormat::Json => serde_json::to_string(log).unwrap_or_default(),
			LogFormat::Csv => format!(
				"{},{},{},{},{},{}",
				log.trace_id, log.request_method, log.request_path, log.response_status(), log.total_processing_ms, log.client_ip
			),
			LogFormat::Text => {
				let colour = status_colour(log.status_class());
				format!(
					"{colour}{method} {path} -> {status} ({ms}ms) [{trace}]\x1b[0m",
					colour = colour,
					method = log.request_method,
					path = log.request_path,
					status = log.response_status(),
					ms = log.total_processing_ms,
					trace = log.trace_id,
				)
			},
		}
	}
}

fn status_colour(class: StatusClass) -> &'static str {
	match class {
		StatusClass::Success => "\x1b[32m",
		StatusClass::Redirect => "\x1b[36m",
		StatusClass::ClientError => "\x1b[33m",
		StatusClass::ServerError => "\x1b[31m",
		StatusClass::Unknown => "\x1b[0m",
	}
}

#[async_trait]
impl LogSink for ConsoleSink {
	async fn write_access_batch(&self, logs: &[AccessLog]) -> Result<(), LogError> {
		for log in logs {
			println!("{}", self.render(log));
		}
		Ok(())
	}

	async fn write_trace_batch(&self, traces: &[BackendTraceLog]) -> Result<(), LogError> {
		for trace in traces {
			println!(
				"{} {} -> {} ({}ms)",
				trace.method,
				trace.forward_url,
				trace.response_status,
				(trace.end_time - trace.start_time).num_milliseconds()
			);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> AccessLog {
		AccessLog { request_method: "GET".into(), request_path: "/x".into(), response_status: 200, ..Default::default() }
	}

	#[test]
	fn json_render_is_valid_json() {
		let sink = ConsoleSink { format: LogFormat::Json };
		let rendered = sink.render(&sample());
		assert!(serde_json::from_str::<serde_json::Value>(&rendered).is_ok());
	}

	#[test]
	fn csv_render_has_six_fields() {
		let sink = ConsoleSink { format: LogFormat::Csv };
		let rendered = sink.render(&sample());
		assert_eq!(rendered.split(',').count(), 6);
	}
}
