pub mod normalizer;
pub mod table;

pub use normalizer::{ReportNormalizer, REPORT_FILTER};
