// Application layer - use cases and orchestration over the repository

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
