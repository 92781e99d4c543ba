use gateway_core::model::HealthStatus;
use sqlx::PgPool;

/// Periodic health report back to `HUB_GW_INSTANCE`:
/// `healthStatus`, `lastHeartbeatTime`, and a truncated error in `reserved1`.
pub async fn report_health(
	pool: &PgPool,
	tenant_id: &str,
	instance_id: &str,
	status: HealthStatus,
	error: Option<&str>,
) -> Result<(), sqlx::Error> {
	let status_str = match status {
		HealthStatus::Healthy => "HEALTHY",
		HealthStatus::Degraded => "DEGRADED",
		HealthStatus::Down => "DOWN",
		HealthStatus::Unknown => "UNKNOWN",
	};
	let reserved1 = error.map(|e| truncate_chars(e, 100));

	sqlx::query(
		"UPDATE hub_gw_instance SET health_status = $1, last_heartbeat_time = now(), reserved1 = $2 \
		 WHERE tenant_id = $3 AND id = $4",
	)
	.bind(status_str)
	.bind(reserved1)
	.bind(tenant_id)
	.bind(instance_id)
	.execute(pool)
	.await?;
	Ok(())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
	s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncate_chars_respects_char_boundary_not_byte_len() {
		let s = "你好世界abcdefghijklmnop";
		let truncated = truncate_chars(s, 5);
		assert_eq!(truncated.chars().count(), 5);
	}
}
