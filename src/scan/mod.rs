pub mod orchestrator;

pub use orchestrator::ScanOrchestrator;
