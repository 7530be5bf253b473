pub mod client;
pub mod error;
pub mod selector;
pub mod types;

pub use client::LokiClient;
pub use error::{LokiError, Result};
pub use selector::{allocation_selector, job_selector};
pub use types::LokiConfig;
