//! `HandleGatewayLogWrite` / `HandleGatewayLogWriteFailure`.
//!
//! Alerts are emitted as structured `tracing` warnings/errors rather than
//! posted to a channel directly; a channel-name field is attached so a
//! downstream `tracing` layer can route on it.

use gateway_core::model::{AccessLog, AlertConfig};

pub fn handle_log_write(alert: &AlertConfig, log: &AccessLog) {
	if !alert.enabled {
		return;
	}
	let status = log.response_status();
	if alert.status_codes.contains(&status) {
		tracing::warn!(
			alert = "GATEWAY_STATUS",
			channel = alert.channel_name.as_deref().unwrap_or("default"),
			trace_id = %log.trace_id,
			status,
			"GATEWAY_{status}"
		);
	}
	if alert.alert_on_timeout && log.total_processing_ms >= alert.timeout_threshold_ms {
		tracing::warn!(
			alert = "GATEWAY_TIMEOUT",
			channel = alert.channel_name.as_deref().unwrap_or("default"),
			trace_id = %log.trace_id,
			total_processing_ms = log.total_processing_ms,
			"GATEWAY_TIMEOUT"
		);
	}
}

pub fn handle_log_write_failure(trace_id: &str, error: &str) {
	tracing::error!(alert = "LOG_WRITE_FAILURE", trace_id, error, "LOG_WRITE_FAILURE");
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_log(status: u16, total_ms: u64) -> AccessLog {
		AccessLog {
			response_status: status,
			total_processing_ms: total_ms,
			trace_id: "t1".into(),
			..Default::default()
		}
	}

	#[test]
	fn disabled_alert_is_noop() {
		let alert = AlertConfig::default();
		handle_log_write(&alert, &sample_log(500, 10));
	}

	#[test]
	fn status_code_match_does_not_panic() {
		let alert = AlertConfig { enabled: true, status_codes: vec![500], ..Default::default() };
		handle_log_write(&alert, &sample_log(500, 10));
	}
}
