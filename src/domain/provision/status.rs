//! Usage: In-memory provisioning status per project, keyed by target (process) name.

use crate::shared::mutex_ext::MutexExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionStatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ProvisionStatusRecord {
    /// Overlays `payload`'s fields onto this record; non-object payloads are ignored.
    pub fn merge_payload(&mut self, payload: &Value) {
        let Some(map) = payload.as_object() else {
            return;
        };
        for (key, value) in map {
            match key.as_str() {
                "status" => match value.as_u64().and_then(|v| u16::try_from(v).ok()) {
                    Some(status) => self.status = Some(status),
                    None => {
                        self.extra.insert(key.clone(), value.clone());
                    }
                },
                "message" => self.message = scalar_string(value),
                "processName" => self.process_name = scalar_string(value),
                "id" => self.id = scalar_string(value),
                "notificationId" => self.notification_id = scalar_string(value),
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }

    pub fn merged(&self, payload: &Value) -> Self {
        let mut next = self.clone();
        next.merge_payload(payload);
        next
    }
}

/// Replace-on-write store; callers read a record, merge, and write the whole value back.
#[derive(Debug, Default)]
pub struct ProvisionStatusStore {
    projects: Mutex<HashMap<String, HashMap<String, ProvisionStatusRecord>>>,
}

impl ProvisionStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &str, target_name: &str) -> Option<ProvisionStatusRecord> {
        self.projects
            .lock_or_recover()
            .get(project_id)
            .and_then(|targets| targets.get(target_name))
            .cloned()
    }

    pub fn set(&self, project_id: &str, target_name: &str, record: ProvisionStatusRecord) {
        self.projects
            .lock_or_recover()
            .entry(project_id.to_string())
            .or_default()
            .insert(target_name.to_string(), record);
    }

    pub fn remove(&self, project_id: &str, target_name: &str) -> Option<ProvisionStatusRecord> {
        let mut projects = self.projects.lock_or_recover();
        let targets = projects.get_mut(project_id)?;
        let removed = targets.remove(target_name);
        if targets.is_empty() {
            projects.remove(project_id);
        }
        removed
    }

    pub fn snapshot(&self, project_id: &str) -> BTreeMap<String, ProvisionStatusRecord> {
        self.projects
            .lock_or_recover()
            .get(project_id)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_known_and_extra_fields() {
        let mut record = ProvisionStatusRecord {
            status: Some(202),
            message: Some("Creating".to_string()),
            process_name: Some("dev".to_string()),
            id: Some("job-1".to_string()),
            notification_id: Some("n1".to_string()),
            extra: Map::new(),
        };
        record.merge_payload(&json!({"status": 500, "message": "quota", "region": "westus"}));
        assert_eq!(record.status, Some(500));
        assert_eq!(record.message.as_deref(), Some("quota"));
        assert_eq!(record.notification_id.as_deref(), Some("n1"));
        assert_eq!(record.extra["region"], "westus");

        let unchanged = record.merged(&json!("not an object"));
        assert_eq!(unchanged, record);
    }

    #[test]
    fn record_serializes_camel_case_with_extra() {
        let mut record = ProvisionStatusRecord {
            process_name: Some("dev".to_string()),
            ..ProvisionStatusRecord::default()
        };
        record.extra.insert("time".to_string(), json!(1));
        let value = serde_json::to_value(&record).expect("json");
        assert_eq!(value, json!({"processName": "dev", "time": 1}));
    }

    #[test]
    fn store_isolates_projects_and_removes_empty() {
        let store = ProvisionStatusStore::new();
        store.set("p1", "dev", ProvisionStatusRecord::default());
        store.set("p1", "prod", ProvisionStatusRecord::default());
        store.set("p2", "dev", ProvisionStatusRecord::default());

        assert_eq!(store.snapshot("p1").len(), 2);
        assert!(store.remove("p1", "dev").is_some());
        assert!(store.get("p1", "dev").is_none());
        assert!(store.get("p2", "dev").is_some());
        assert!(store.remove("p2", "dev").is_some());
        assert!(store.snapshot("p2").is_empty());
        assert!(store.remove("p2", "dev").is_none());
    }
}
