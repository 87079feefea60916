//! Usage: Domain modules (provisioning dispatch, LUIS publishing).

pub mod luis;
pub mod provision;
