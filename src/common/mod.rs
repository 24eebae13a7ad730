pub mod models;
pub mod protocol;

pub use models::*;
pub use protocol::*;
