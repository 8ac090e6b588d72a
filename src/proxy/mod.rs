// src/proxy/mod.rs
mod backend;
mod pool;
mod session;

pub use backend::{Backend, BackendAddr, BackendStatus, ConnectionGuard};
pub use pool::BackendPool;
pub use session::{ProxyError, ProxySession, SessionReport, SessionStats};
