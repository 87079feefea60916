mod app;
pub mod auth;
mod cli;
mod commands;
pub mod domain;
pub mod infra;
pub mod shared;
pub mod test_support;

pub(crate) use app::app_state;
pub(crate) use shared::blocking;

pub use cli::Cli;

/// Entry point of the `composer-hub` binary.
pub fn run() -> std::process::ExitCode {
    cli::run()
}
