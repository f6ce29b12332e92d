/// Transient status notices
///
/// At most one notice is visible at a time. Each notice clears itself after
/// the configured time-to-live unless a newer notice replaced it first.
use crate::config::StatusConfig;
use crate::error::AppError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Clone)]
pub struct StatusBoard {
    current: Arc<watch::Sender<Option<StatusNotice>>>,
    generation: Arc<AtomicU64>,
    ttl: Duration,
}

impl StatusBoard {
    pub fn new(ttl: Duration) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
            generation: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        Self::new(Duration::from_secs(config.notice_ttl_secs))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusNotice>> {
        self.current.subscribe()
    }

    pub fn current(&self) -> Option<StatusNotice> {
        self.current.borrow().clone()
    }

    /// Show a notice, replacing any visible one. Must run inside a tokio
    /// runtime; the clear timer is a spawned task.
    pub fn show(&self, kind: NoticeKind, message: impl Into<String>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let notice = StatusNotice {
            kind,
            message: message.into(),
        };
        debug!(?notice, "status notice");
        self.current.send_replace(Some(notice));

        let current = Arc::clone(&self.current);
        let latest = Arc::clone(&self.generation);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if latest.load(Ordering::SeqCst) == generation {
                current.send_replace(None);
            }
        });
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(NoticeKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(NoticeKind::Error, message)
    }

    pub fn report(&self, err: &AppError) {
        self.error(err.user_message())
    }
}
