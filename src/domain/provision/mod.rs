//! Usage: Provisioning dispatch and status polling.

mod api;
mod notifications;
mod poller;
mod status;

pub use api::{ProvisionApi, ProvisionApiError, ProvisionStarted, ProvisionStatusResponse};
pub use notifications::{
    Notification, NotificationCenter, NotificationKind, Notifier, MAX_NOTIFICATIONS,
};
pub use poller::{ProvisionOutcome, ProvisionPoller, ProvisionRequest, ProvisionTask};
pub use status::{ProvisionStatusRecord, ProvisionStatusStore};
