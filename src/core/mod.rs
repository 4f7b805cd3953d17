//! Core: data model, reducer and shared constants. No I/O in here.

pub mod paths;
pub mod reducer;
pub mod state;

pub use reducer::reduce;
pub use state::{Action, GlobalState, PriorConnection, ProviderKey, ProviderState};
