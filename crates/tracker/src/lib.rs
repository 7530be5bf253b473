//! Run lifecycle and Nomad event services
//!
//! Ties the event store, the allocation projection, the Nomad client and the
//! Loki aggregator together behind the operations request handlers call.

pub mod error;
mod event_service;
mod run_service;
mod staged;

pub use error::{Result, TrackerError};
pub use event_service::NomadEventService;
pub use run_service::RunService;
pub use staged::Staged;
