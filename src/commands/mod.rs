//! Usage: Command layer invoked by the CLI; each command maps errors to `CODE: message` strings.

pub(crate) mod auth;
pub(crate) mod host;
pub(crate) mod luis;
pub(crate) mod provision;
