pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpNomadClient, NomadClient};
pub use error::{NomadError, Result};
pub use types::{DeregisterResponse, NomadConfig};
