pub mod config;
pub mod session;
pub mod storage;

pub use config::SessionConfig;
pub use session::{EngineRequest, EngineResponse, Session};
