//! Usage: Provisioning commands (start + wait, status snapshot, publish targets).

use crate::app_state::AppState;
use crate::domain::provision::{
    Notification, ProvisionOutcome, ProvisionRequest, ProvisionStatusRecord,
};
use crate::infra::project_settings::PublishTarget;
use crate::blocking;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProvisionSummary {
    pub outcome: &'static str,
    pub notification: Option<Notification>,
    pub status: BTreeMap<String, ProvisionStatusRecord>,
}

fn outcome_label(outcome: ProvisionOutcome) -> &'static str {
    match outcome {
        ProvisionOutcome::Succeeded => "succeeded",
        ProvisionOutcome::Failed => "failed",
        ProvisionOutcome::Cancelled => "cancelled",
    }
}

/// Starts provisioning and waits for the poll task; Ctrl-C cancels the task.
pub(crate) async fn provision_and_wait(
    state: &AppState,
    request: ProvisionRequest,
) -> Result<ProvisionSummary, String> {
    let project_id = request.project_id.clone();
    let Some(task) = state.poller.provision_to_target(request).await else {
        return Ok(ProvisionSummary {
            outcome: outcome_label(ProvisionOutcome::Failed),
            notification: state.notifications.latest(),
            status: state.poller.statuses().snapshot(&project_id),
        });
    };

    let notification_id = task.notification_id().to_string();
    let cancel = task.cancel_token();
    let outcome = tokio::select! {
        outcome = task.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(project_id = %project_id, "interrupted; cancelling provision polling");
            cancel.cancel();
            ProvisionOutcome::Cancelled
        }
    };

    Ok(ProvisionSummary {
        outcome: outcome_label(outcome),
        notification: state.notifications.get(&notification_id),
        status: state.poller.statuses().snapshot(&project_id),
    })
}

pub(crate) async fn publish_targets_list(
    state: &AppState,
    project_id: String,
) -> Result<Vec<PublishTarget>, String> {
    let settings = state.settings.clone();
    blocking::run("publish_targets_list", move || settings.read(&project_id))
        .await
        .map(|settings| settings.publish_targets)
        .map_err(Into::into)
}
