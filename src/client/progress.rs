//! Client progress tracking
//!
//! Records the latest `notifications/progress` value per token and broadcasts
//! every update to subscribers.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::{ ProgressParams, ProgressToken };

/// One progress report for a token
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub token: ProgressToken,
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

impl ProgressUpdate {
    /// Progress as a percentage of `total`, when the total is known
    pub fn percentage(&self) -> Option<f64> {
        self.total.filter(|total| *total > 0.0).map(|total| (self.progress / total) * 100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| self.progress >= total)
    }
}

impl From<ProgressParams> for ProgressUpdate {
    fn from(params: ProgressParams) -> Self {
        Self {
            token: params.progress_token,
            progress: params.progress,
            total: params.total,
            message: params.message,
        }
    }
}

/// Handler for tracking progress operations
pub struct ProgressTracker {
    latest: Mutex<HashMap<ProgressToken, ProgressUpdate>>,
    progress_tx: broadcast::Sender<ProgressUpdate>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            latest: Mutex::new(HashMap::new()),
            progress_tx,
        }
    }

    /// A fresh token for a request that wants progress
    pub fn new_token() -> ProgressToken {
        ProgressToken::String(uuid::Uuid::new_v4().to_string())
    }

    /// Record a progress notification
    pub fn record(&self, params: ProgressParams) {
        let update = ProgressUpdate::from(params);
        debug!("Progress for {}: {}", update.token, update.progress);
        self.latest
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(update.token.clone(), update.clone());
        let _ = self.progress_tx.send(update);
    }

    /// Receive every update recorded from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.progress_tx.subscribe()
    }

    /// Most recent update for `token`
    pub fn latest(&self, token: &ProgressToken) -> Option<ProgressUpdate> {
        self.latest
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(token)
            .cloned()
    }

    /// Stop tracking `token`
    pub fn forget(&self, token: &ProgressToken) {
        self.latest.lock().unwrap_or_else(|p| p.into_inner()).remove(token);
    }
}
