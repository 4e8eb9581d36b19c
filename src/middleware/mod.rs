//! Request middleware applied to every route.
//!
//! - **RequestLogging**: tags each request with an id and logs start and completion
//! - **MetricsMiddleware**: per-route request, error and latency counters

pub mod logging;
pub mod metrics;

pub use logging::RequestLogging;
pub use metrics::MetricsMiddleware;
