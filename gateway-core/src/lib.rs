pub mod error;
pub mod ids;
pub mod matcher;
pub mod model;
pub mod prelude;

pub use error::GatewayError;
pub use ids::{BackendTraceId, TraceId};
pub use model::GatewayConfig;
