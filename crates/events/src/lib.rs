//! Run lifecycle notifications
//!
//! Downstream consumers learn about run transitions (and receive the terminal
//! output of ended runs) by subscribing to the [`EventBus`].

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
