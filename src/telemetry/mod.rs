pub mod backend;
pub mod metrics;
pub mod scheduler;

pub use backend::{HttpBackend, TelemetrySink};
pub use metrics::{host_name, MetricsSnapshot, SystemSampler};
pub use scheduler::TelemetryScheduler;
