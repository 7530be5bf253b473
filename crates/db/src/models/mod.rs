mod nomad_event;
mod run;

pub use nomad_event::*;
pub use run::*;
