//! Errors surfaced by the log pipeline (`LogWriteFailure`).

#[derive(thiserror::Error, Debug)]
pub enum LogError {
	#[error("output target {0:?} has no sink implementation")]
	NotImplemented(gateway_core::model::OutputTarget),

	#[error("log sink config invalid: {0}")]
	InvalidConfig(String),

	#[error("sink write failed: {0}")]
	Sink(String),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}
