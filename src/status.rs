//! Process-wide sync status.
//!
//! One [`StatusCell`] is shared by the sync engine and every reader. Readers
//! always get a complete copy; writers replace the whole record at once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub message: String,
    /// Set when a run fails; kept while a later run is in progress and
    /// cleared once a run succeeds.
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub processed: u64,
    pub total: u64,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            message: "No sync has run yet".to_string(),
            last_error: None,
            last_success_at: None,
            processed: 0,
            total: 0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SyncTriggerError {
    #[error("a sync is already in progress")]
    AlreadyRunning,
}

#[derive(Debug, Default)]
pub struct StatusCell {
    inner: Mutex<SyncStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        // The record is replaced wholesale, so a poisoned guard still holds a
        // consistent value.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.lock().clone()
    }

    /// Move to `Syncing` unless a run is already in progress. Check and set
    /// happen under one lock.
    pub fn try_begin(&self) -> Result<(), SyncTriggerError> {
        let mut status = self.lock();
        if status.phase == SyncPhase::Syncing {
            return Err(SyncTriggerError::AlreadyRunning);
        }
        *status = SyncStatus {
            phase: SyncPhase::Syncing,
            message: "Sync started".to_string(),
            last_error: status.last_error.clone(),
            last_success_at: status.last_success_at,
            processed: 0,
            total: 0,
        };
        Ok(())
    }

    /// Replace the record with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&SyncStatus) -> SyncStatus,
    {
        let mut status = self.lock();
        let next = f(&status);
        *status = next;
    }
}
