pub mod alert;
pub mod error;
pub mod registry;
pub mod sinks;
pub mod snapshot;
pub mod writer;

pub use error::LogError;
pub use registry::LogWriterRegistry;
pub use writer::{LogWriter, WriterState};
