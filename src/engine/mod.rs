pub mod gmp;
pub mod mock;
pub mod session;
pub mod xml;

pub use gmp::GmpConnector;
pub use mock::{MockCall, MockEngine};
pub use session::{with_session, GmpSession, SessionFactory};
