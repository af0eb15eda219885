//! Library surface of the extender service; the binary wires these
//! together, integration tests drive the router directly.

pub mod api;
pub mod config;
pub mod scope;
pub mod state;
