//! Usage: User-visible provisioning notifications (created once, updated in place per poll tick).

use crate::shared::mutex_ext::MutexExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            kind,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn add(&self, notification: Notification);

    fn update(&self, id: &str, notification: Notification);
}

/// Older finished notifications are evicted past this many entries.
pub const MAX_NOTIFICATIONS: usize = 200;

#[derive(Debug)]
struct Entry {
    notification: Notification,
    updates: usize,
    seq: u64,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<String, Entry>,
    next_seq: u64,
}

impl Entries {
    fn insert(&mut self, id: String, notification: Notification, updates: usize) {
        if self.by_id.len() >= MAX_NOTIFICATIONS {
            self.evict_oldest();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(
            id,
            Entry {
                notification,
                updates,
                seq,
            },
        );
    }

    /// Drops the oldest finished entry; live pending ones go only when nothing else is left.
    fn evict_oldest(&mut self) {
        let oldest_finished = self
            .by_id
            .iter()
            .filter(|(_, e)| e.notification.kind != NotificationKind::Pending)
            .min_by_key(|(_, e)| e.seq)
            .map(|(id, _)| id.clone());
        let victim = oldest_finished.or_else(|| {
            self.by_id
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(id, _)| id.clone())
        });
        if let Some(id) = victim {
            self.by_id.remove(&id);
        }
    }
}

/// Keeps the latest state of every notification plus how many times each was updated,
/// bounded by [`MAX_NOTIFICATIONS`].
#[derive(Debug, Default)]
pub struct NotificationCenter {
    entries: Mutex<Entries>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.entries
            .lock_or_recover()
            .by_id
            .get(id)
            .map(|e| e.notification.clone())
    }

    pub fn update_count(&self, id: &str) -> usize {
        self.entries
            .lock_or_recover()
            .by_id
            .get(id)
            .map(|e| e.updates)
            .unwrap_or(0)
    }

    /// Most recently added notification.
    pub fn latest(&self) -> Option<Notification> {
        self.entries
            .lock_or_recover()
            .by_id
            .values()
            .max_by_key(|e| e.seq)
            .map(|e| e.notification.clone())
    }

    pub fn all(&self) -> Vec<Notification> {
        let entries = self.entries.lock_or_recover();
        let mut all: Vec<&Entry> = entries.by_id.values().collect();
        all.sort_by_key(|e| e.seq);
        all.into_iter().map(|e| e.notification.clone()).collect()
    }
}

impl Notifier for NotificationCenter {
    fn add(&self, notification: Notification) {
        tracing::info!(
            id = %notification.id,
            kind = ?notification.kind,
            title = %notification.title,
            "{}",
            notification.description
        );
        let mut entries = self.entries.lock_or_recover();
        entries.by_id.remove(&notification.id);
        entries.insert(notification.id.clone(), notification, 0);
    }

    fn update(&self, id: &str, notification: Notification) {
        tracing::info!(
            id,
            kind = ?notification.kind,
            title = %notification.title,
            "{}",
            notification.description
        );
        let mut entries = self.entries.lock_or_recover();
        if let Some(entry) = entries.by_id.get_mut(id) {
            entry.notification = notification;
            entry.updates += 1;
            return;
        }
        entries.insert(id.to_string(), notification, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_replaces_and_counts() {
        let center = NotificationCenter::new();
        center.add(Notification::new("n1", NotificationKind::Pending, "Provisioning", "start"));
        assert_eq!(center.update_count("n1"), 0);

        center.update(
            "n1",
            Notification::new("n1", NotificationKind::Pending, "Provisioning", "still"),
        );
        center.update(
            "n1",
            Notification::new("n1", NotificationKind::Success, "Provision success", "done"),
        );
        assert_eq!(center.update_count("n1"), 2);
        assert_eq!(center.get("n1").expect("n1").kind, NotificationKind::Success);
        assert_eq!(center.all().len(), 1);

        center.add(Notification::new("a0", NotificationKind::Error, "Provision failure", "x"));
        assert_eq!(center.latest().expect("latest").id, "a0");
        assert_eq!(center.all()[0].id, "n1");
    }

    #[test]
    fn finished_notifications_are_evicted_past_the_cap() {
        let center = NotificationCenter::new();
        center.add(Notification::new("live", NotificationKind::Pending, "Provisioning", "start"));
        for i in 0..MAX_NOTIFICATIONS + 10 {
            center.add(Notification::new(
                format!("done-{i}"),
                NotificationKind::Error,
                "Provision failure",
                "boom",
            ));
        }

        let all = center.all();
        assert_eq!(all.len(), MAX_NOTIFICATIONS);
        assert_eq!(all[0].id, "live");
        assert!(center.get("done-0").is_none());
        assert!(center.get("done-10").is_none());
        assert!(center.get("done-11").is_some());
        assert_eq!(center.latest().expect("latest").id, format!("done-{}", MAX_NOTIFICATIONS + 9));

        center.update(
            "live",
            Notification::new("live", NotificationKind::Pending, "Provisioning", "still"),
        );
        assert_eq!(center.update_count("live"), 1);
    }

    #[test]
    fn serializes_kind_as_type() {
        let value = serde_json::to_value(Notification::new(
            "n1",
            NotificationKind::Error,
            "Provision failure",
            "boom",
        ))
        .expect("json");
        assert_eq!(value["type"], "error");
    }
}
