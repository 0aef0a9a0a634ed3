use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, OnceLock};

use serde::Serialize;
use tracing::{error, info};

static CENTER: OnceLock<NotificationCenter> = OnceLock::new();
static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum JobStatus {
    Loading(String),
    Success(String),
    Failure(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Loading(_))
    }

    pub fn message(&self) -> &str {
        match self {
            JobStatus::Loading(message)
            | JobStatus::Success(message)
            | JobStatus::Failure(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub job_id: u64,
    #[serde(flatten)]
    pub status: JobStatus,
}

pub trait Notifier: Send + Sync {
    fn enqueue(&self, notification: Notification);
}

/// Fan-out of job statuses to every live subscriber.
#[derive(Default)]
pub struct NotificationCenter {
    subscribers: Mutex<Vec<Sender<Notification>>>,
}

impl NotificationCenter {
    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }
}

impl Notifier for NotificationCenter {
    fn enqueue(&self, notification: Notification) {
        match &notification.status {
            JobStatus::Failure(message) => error!(job = notification.job_id, "{message}"),
            status => info!(job = notification.job_id, "{}", status.message()),
        }
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
        }
    }
}

/// The process-wide notification surface, created on first use.
pub fn center() -> &'static NotificationCenter {
    CENTER.get_or_init(NotificationCenter::default)
}

pub fn next_job_id() -> u64 {
    NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_a_singleton() {
        assert!(std::ptr::eq(center(), center()));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let center = NotificationCenter::default();
        let kept = center.subscribe();
        drop(center.subscribe());

        center.enqueue(Notification {
            job_id: 7,
            status: JobStatus::Loading("Downloading a - b...".to_string()),
        });

        assert_eq!(kept.try_recv().unwrap().job_id, 7);
        assert_eq!(center.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(Notification {
            job_id: 1,
            status: JobStatus::Success("Downloaded 1/2 files".to_string()),
        })
        .unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Downloaded 1/2 files");
    }
}
