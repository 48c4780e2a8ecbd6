//! Command implementations for busdiag

pub mod dtc;
pub mod monitor;
pub mod ports;
pub mod read_did;
pub mod request;
pub mod reset;
pub mod send;
pub mod session;
pub mod unlock;

pub use dtc::dtc;
pub use monitor::monitor;
pub use ports::ports;
pub use read_did::read_did;
pub use request::request;
pub use reset::reset;
pub use send::send;
pub use session::session;
pub use unlock::unlock;
