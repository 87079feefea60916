//! Usage: Fire-and-forget provisioning dispatcher that polls job status until a terminal outcome.

use super::api::{ProvisionApi, ProvisionApiError, ProvisionStatusResponse};
use super::notifications::{Notification, NotificationKind, Notifier};
use super::status::{ProvisionStatusRecord, ProvisionStatusStore};
use crate::infra::project_settings::{ProjectSettingsStore, PublishTarget};
use crate::shared::blocking;
use crate::shared::mutex_ext::MutexExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const TITLE_PENDING: &str = "Provisioning";
const TITLE_SUCCESS: &str = "Provision success";
const TITLE_FAILURE: &str = "Provision failure";

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub project_id: String,
    pub target_type: String,
    /// Opaque provisioning config; its `name` becomes the target name.
    pub config: Value,
    pub arm_token: String,
    pub graph_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// Handle of one live poll task; dropping it does not stop the task, `cancel` does.
#[derive(Debug)]
pub struct ProvisionTask {
    project_id: String,
    target_name: String,
    job_id: String,
    notification_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<ProvisionOutcome>,
}

impl ProvisionTask {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> ProvisionOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    project_id = %self.project_id,
                    target = %self.target_name,
                    "provision poll task aborted: {err}"
                );
                ProvisionOutcome::Failed
            }
        }
    }
}

type ActiveKey = (String, String);

/// Releases the `(project, target)` slot when the owning attempt ends.
struct ActiveSlot {
    registry: Arc<Mutex<HashSet<ActiveKey>>>,
    key: ActiveKey,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.registry.lock_or_recover().remove(&self.key);
    }
}

struct PollerInner {
    api: ProvisionApi,
    statuses: Arc<ProvisionStatusStore>,
    settings: Arc<ProjectSettingsStore>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    active: Arc<Mutex<HashSet<ActiveKey>>>,
}

#[derive(Clone)]
pub struct ProvisionPoller {
    inner: Arc<PollerInner>,
}

struct PollJob {
    project_id: String,
    target_type: String,
    target_name: String,
    job_id: String,
    notification_id: String,
    arm_token: String,
}

enum Tick {
    Continue,
    Done(ProvisionOutcome),
}

fn new_notification_id() -> String {
    format!("provision-{:016x}", rand::random::<u64>())
}

fn target_name_of(config: &Value) -> Option<String> {
    config
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn payload_message(payload: Option<&Value>) -> Option<String> {
    payload
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl ProvisionPoller {
    pub fn new(
        api: ProvisionApi,
        statuses: Arc<ProvisionStatusStore>,
        settings: Arc<ProjectSettingsStore>,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                api,
                statuses,
                settings,
                notifier,
                poll_interval: poll_interval.max(Duration::from_millis(1)),
                active: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    pub fn statuses(&self) -> &Arc<ProvisionStatusStore> {
        &self.inner.statuses
    }

    pub fn is_active(&self, project_id: &str, target_name: &str) -> bool {
        self.inner
            .active
            .lock_or_recover()
            .contains(&(project_id.to_string(), target_name.to_string()))
    }

    fn claim(&self, key: ActiveKey) -> Option<ActiveSlot> {
        let mut active = self.inner.active.lock_or_recover();
        if !active.insert(key.clone()) {
            return None;
        }
        Some(ActiveSlot {
            registry: self.inner.active.clone(),
            key,
        })
    }

    /// Starts provisioning; failures become notifications and `None`, never errors.
    pub async fn provision_to_target(&self, request: ProvisionRequest) -> Option<ProvisionTask> {
        let notifier = &self.inner.notifier;

        let Some(target_name) = target_name_of(&request.config) else {
            tracing::warn!(project_id = %request.project_id, "provision config has no name");
            notifier.add(Notification::new(
                new_notification_id(),
                NotificationKind::Error,
                TITLE_FAILURE,
                "Provisioning config must include a name",
            ));
            return None;
        };

        let Some(slot) = self.claim((request.project_id.clone(), target_name.clone())) else {
            tracing::warn!(
                project_id = %request.project_id,
                target = %target_name,
                "provisioning already in progress for target; attempt rejected"
            );
            return None;
        };

        let started = match self
            .inner
            .api
            .start(
                &request.project_id,
                &request.target_type,
                &request.config,
                &request.arm_token,
                &request.graph_token,
            )
            .await
        {
            Ok(started) => started,
            Err(err) => {
                tracing::error!(
                    project_id = %request.project_id,
                    target = %target_name,
                    "provision request failed: {err}"
                );
                notifier.add(Notification::new(
                    new_notification_id(),
                    NotificationKind::Error,
                    TITLE_FAILURE,
                    err.message,
                ));
                return None;
            }
        };

        let notification_id = new_notification_id();
        notifier.add(Notification::new(
            notification_id.clone(),
            NotificationKind::Pending,
            TITLE_PENDING,
            started
                .message
                .clone()
                .unwrap_or_else(|| format!("Provisioning {target_name}")),
        ));

        let mut record = ProvisionStatusRecord::default().merged(&started.raw);
        record.id = Some(started.job_id.clone());
        record.process_name = record
            .process_name
            .or_else(|| started.process_name.clone())
            .or_else(|| Some(target_name.clone()));
        record.notification_id = Some(notification_id.clone());
        self.inner
            .statuses
            .set(&request.project_id, &target_name, record);

        tracing::info!(
            project_id = %request.project_id,
            target = %target_name,
            job_id = %started.job_id,
            "provisioning started; polling status"
        );

        let job = PollJob {
            project_id: request.project_id.clone(),
            target_type: request.target_type.clone(),
            target_name: target_name.clone(),
            job_id: started.job_id.clone(),
            notification_id: notification_id.clone(),
            arm_token: request.arm_token,
        };
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poll_loop(
            self.inner.clone(),
            job,
            cancel.clone(),
            slot,
        ));

        Some(ProvisionTask {
            project_id: request.project_id,
            target_name,
            job_id: started.job_id,
            notification_id,
            cancel,
            handle,
        })
    }
}

async fn run_poll_loop(
    inner: Arc<PollerInner>,
    job: PollJob,
    cancel: CancellationToken,
    _slot: ActiveSlot,
) -> ProvisionOutcome {
    let start = tokio::time::Instant::now() + inner.poll_interval;
    let mut ticker = tokio::time::interval_at(start, inner.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(
                    project_id = %job.project_id,
                    target = %job.target_name,
                    "provision polling cancelled"
                );
                return ProvisionOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        match poll_once(&inner, &job).await {
            Tick::Continue => {}
            Tick::Done(outcome) => {
                cancel.cancel();
                return outcome;
            }
        }
    }
}

/// One tick: exactly one notification update, then continue or finish.
async fn poll_once(inner: &PollerInner, job: &PollJob) -> Tick {
    let result = inner
        .api
        .status(
            &job.project_id,
            &job.target_type,
            &job.target_name,
            &job.job_id,
            &job.arm_token,
        )
        .await;

    match result {
        Ok(response) if response.is_success() => on_success(inner, job, &response).await,
        Ok(response) if response.is_failure() => {
            merge_status(inner, job, &response.raw, Some(response.http_status));
            notify(
                inner,
                job,
                NotificationKind::Error,
                TITLE_FAILURE,
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Provisioning {} failed", job.target_name)),
            );
            tracing::warn!(
                project_id = %job.project_id,
                target = %job.target_name,
                "provisioning failed on the server"
            );
            Tick::Done(ProvisionOutcome::Failed)
        }
        Ok(response) => {
            merge_status(inner, job, &response.raw, Some(response.http_status));
            notify(
                inner,
                job,
                NotificationKind::Pending,
                TITLE_PENDING,
                response
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Provisioning {}", job.target_name)),
            );
            Tick::Continue
        }
        Err(err) => on_error(inner, job, err),
    }
}

async fn on_success(inner: &PollerInner, job: &PollJob, response: &ProvisionStatusResponse) -> Tick {
    let config = response.config.clone().unwrap_or(Value::Null);
    let configuration = match serde_json::to_string_pretty(&config) {
        Ok(text) => text,
        Err(err) => {
            return on_error(
                inner,
                job,
                ProvisionApiError {
                    message: format!("failed to serialize provisioned config: {err}"),
                    payload: None,
                },
            )
        }
    };
    let target = PublishTarget {
        name: job.target_name.clone(),
        target_type: job.target_type.clone(),
        configuration,
    };

    let settings = inner.settings.clone();
    let project_id = job.project_id.clone();
    let saved = blocking::run("project_settings_append_target", move || {
        settings.append_publish_target(&project_id, target)
    })
    .await;
    if let Err(err) = saved {
        tracing::error!(
            project_id = %job.project_id,
            target = %job.target_name,
            "failed to save publish target: {err}"
        );
        // The status record is the only copy of the provisioned config until it is saved.
        merge_status(inner, job, &response.raw, Some(response.http_status));
        notify(
            inner,
            job,
            NotificationKind::Error,
            TITLE_FAILURE,
            format!("Provisioned {} but saving the publish target failed", job.target_name),
        );
        return Tick::Done(ProvisionOutcome::Failed);
    }
    inner.statuses.remove(&job.project_id, &job.target_name);

    notify(
        inner,
        job,
        NotificationKind::Success,
        TITLE_SUCCESS,
        response
            .message
            .clone()
            .unwrap_or_else(|| format!("Provisioned {} successfully", job.target_name)),
    );
    tracing::info!(
        project_id = %job.project_id,
        target = %job.target_name,
        "provisioning succeeded; publish target saved"
    );
    Tick::Done(ProvisionOutcome::Succeeded)
}

fn on_error(inner: &PollerInner, job: &PollJob, err: ProvisionApiError) -> Tick {
    tracing::error!(
        project_id = %job.project_id,
        target = %job.target_name,
        "provision status poll failed: {err}"
    );
    if let Some(payload) = err.payload.as_ref() {
        merge_status(inner, job, payload, None);
    }
    let description = payload_message(err.payload.as_ref()).unwrap_or(err.message);
    notify(inner, job, NotificationKind::Error, TITLE_FAILURE, description);
    Tick::Done(ProvisionOutcome::Failed)
}

fn merge_status(inner: &PollerInner, job: &PollJob, payload: &Value, http_status: Option<u16>) {
    let previous = inner
        .statuses
        .get(&job.project_id, &job.target_name)
        .unwrap_or_default();
    let mut next = previous.merged(payload);
    let payload_has_status = payload.get("status").is_some_and(Value::is_u64);
    if let (Some(status), false) = (http_status, payload_has_status) {
        next.status = Some(status);
    }
    inner
        .statuses
        .set(&job.project_id, &job.target_name, next);
}

fn notify(
    inner: &PollerInner,
    job: &PollJob,
    kind: NotificationKind,
    title: &str,
    description: String,
) {
    inner.notifier.update(
        &job.notification_id,
        Notification::new(job.notification_id.clone(), kind, title, description),
    );
}
