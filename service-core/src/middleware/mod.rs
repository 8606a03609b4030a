//! HTTP middleware shared by every service router.

pub mod metrics;
pub mod tracing;

pub use self::metrics::metrics_middleware;
pub use self::tracing::{actor_id_from_headers, request_id_middleware, ACTOR_ID_HEADER, REQUEST_ID_HEADER};
