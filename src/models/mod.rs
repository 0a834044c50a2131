pub mod finding;
pub mod scan;

pub use finding::*;
pub use scan::*;
