mod allocation_projector;
mod nomad_event_repository;
mod run_output_repository;
mod run_repository;

pub use allocation_projector::*;
pub use nomad_event_repository::*;
pub use run_output_repository::*;
pub use run_repository::*;
