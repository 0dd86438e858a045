use crate::cache::ResourceKey;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Error,
}

/// Snapshot of a single download's progress
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub percent: f32,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub message: Option<String>,
}

/// A progress report from a transfer
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressUpdate {
    Downloading {
        percent: f32,
        speed: Option<String>,
        eta: Option<String>,
    },
    Completed,
    Failed(String),
}

impl ProgressState {
    fn apply(&mut self, update: ProgressUpdate) {
        // Terminal states stick
        if matches!(self.status, ProgressStatus::Completed | ProgressStatus::Error) {
            return;
        }
        match update {
            ProgressUpdate::Downloading {
                percent,
                speed,
                eta,
            } => {
                self.status = ProgressStatus::Downloading;
                self.percent = percent.clamp(0.0, 100.0);
                self.speed = speed;
                self.eta = eta;
            }
            ProgressUpdate::Completed => {
                self.status = ProgressStatus::Completed;
                self.percent = 100.0;
                self.eta = None;
                self.message = Some("Download completed!".to_string());
            }
            ProgressUpdate::Failed(message) => {
                self.status = ProgressStatus::Error;
                self.message = Some(message);
            }
        }
    }
}

/// Receives progress reports from a running transfer
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Per-download progress owner, backed by a watch channel
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    state: Arc<watch::Sender<ProgressState>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProgressState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.borrow().clone()
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, update: ProgressUpdate) {
        self.state.send_modify(|state| state.apply(update));
    }
}

/// Live progress of every active download, by key
#[derive(Debug, Default)]
pub struct ProgressBoard {
    active: DashMap<ResourceKey, (u64, watch::Receiver<ProgressState>)>,
    next_token: AtomicU64,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `tracker` under `key` until the returned registration is
    /// dropped, or until a later registration for the same key replaces it
    pub fn register(self: &Arc<Self>, key: ResourceKey, tracker: &ProgressTracker) -> ProgressRegistration {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.active.insert(key.clone(), (token, tracker.subscribe()));
        ProgressRegistration {
            board: Arc::clone(self),
            key,
            token,
        }
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Option<ProgressState> {
        self.active.get(key).map(|entry| entry.1.borrow().clone())
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[derive(Debug)]
pub struct ProgressRegistration {
    board: Arc<ProgressBoard>,
    key: ResourceKey,
    token: u64,
}

impl Drop for ProgressRegistration {
    fn drop(&mut self) {
        self.board
            .active
            .remove_if(&self.key, |_, (token, _)| *token == self.token);
    }
}
