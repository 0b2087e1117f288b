//! Observability: structured logging and the metrics endpoint.

pub mod init;
pub mod metrics;

pub use init::init_tracing;
pub use metrics::{install_node_metrics, metrics_router, record_event_ingested, record_settled_epoch};
