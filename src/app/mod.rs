//! Usage: Application wiring (logging, shared state).

pub mod app_state;
pub mod logging;
