pub mod types;
pub mod classification;

pub use types::AgentError;
pub use classification::ErrorClassification;
