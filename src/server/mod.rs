pub mod listener;
pub mod router;

pub use listener::{bind_tcp, ServerError};
pub use router::Router;
