pub mod results;
pub mod scans;
pub mod status;
