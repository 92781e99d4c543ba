//! Error kinds shared across the request pipeline.
//!
//! Each variant carries its default client-facing status; callers that want a
//! configured override (e.g. a route's `notFoundStatusCode`) apply it on top
//! of `default_status()` rather than threading it through construction.

use axum::http::StatusCode;

#[derive(thiserror::Error, Debug, Clone)]
pub enum GatewayError {
	#[error("instance not found: {0}")]
	InstanceNotFound(String),

	#[error("no route matched the request")]
	RouteNotFound,

	#[error("filter {filter} failed: {message}")]
	FilterFailed { filter: String, message: String },

	#[error("access denied by security gate: {0}")]
	AccessDenied(String),

	#[error("authentication failed: {0}")]
	AuthFailed(String),

	#[error("rate limit exceeded")]
	RateLimited,

	#[error("no healthy node available for service {0}")]
	NoHealthyNode(String),

	#[error("upstream timed out after {0:?}")]
	UpstreamTimeout(std::time::Duration),

	#[error("upstream failure: {0}")]
	UpstreamFailure(String),

	#[error("client closed the connection")]
	ClientClosed,

	#[error("log sink write failed: {0}")]
	LogWriteFailure(String),
}

impl GatewayError {
	/// The error-kind name written verbatim into `AccessLog.errorCode`.
	pub fn code(&self) -> &'static str {
		match self {
			GatewayError::InstanceNotFound(_) => "InstanceNotFound",
			GatewayError::RouteNotFound => "RouteNotFound",
			GatewayError::FilterFailed { .. } => "FilterFailed",
			GatewayError::AccessDenied(_) => "AccessDenied",
			GatewayError::AuthFailed(_) => "AuthFailed",
			GatewayError::RateLimited => "RateLimited",
			GatewayError::NoHealthyNode(_) => "NoHealthyNode",
			GatewayError::UpstreamTimeout(_) => "UpstreamTimeout",
			GatewayError::UpstreamFailure(_) => "UpstreamFailure",
			GatewayError::ClientClosed => "ClientClosed",
			GatewayError::LogWriteFailure(_) => "LogWriteFailure",
		}
	}

	pub fn default_status(&self) -> StatusCode {
		match self {
			GatewayError::InstanceNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
			GatewayError::FilterFailed { .. } => StatusCode::BAD_GATEWAY,
			GatewayError::AccessDenied(_) => StatusCode::FORBIDDEN,
			GatewayError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
			GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
			GatewayError::NoHealthyNode(_) => StatusCode::SERVICE_UNAVAILABLE,
			GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
			GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
			GatewayError::ClientClosed => StatusCode::INTERNAL_SERVER_ERROR,
			GatewayError::LogWriteFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Whether this error is ever surfaced to the client, vs. logged/alerted only.
	pub fn is_client_facing(&self) -> bool {
		!matches!(
			self,
			GatewayError::InstanceNotFound(_) | GatewayError::ClientClosed | GatewayError::LogWriteFailure(_)
		)
	}
}
