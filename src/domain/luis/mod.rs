//! Usage: One-shot LUIS publishing (prediction account assignment).

mod api;
mod publish;
mod settings_files;

pub use api::{AzureAccount, LuisAuthoringApi, EXPIRED_TOKEN_REMEDIATION};
pub use publish::{publish_luis_to_prediction, LuisPublishRequest};
pub use settings_files::{find_settings_files, read_app_ids, DIALOGS_DIR_NAME};
