mod allocation;
mod loki;
mod nomad_event;
mod run;

pub use allocation::*;
pub use loki::*;
pub use nomad_event::*;
pub use run::*;
