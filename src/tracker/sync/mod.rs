//! Pushes project totals to a remote service.
//!
//! Delivery is at-most-once: a report is attempted once, in the background, and dropped if it
//! fails. Nothing here retries or queues, and local tracking never waits on the outcome. A failed
//! report only shows up in [SyncStatus] until the next successful one.

pub mod http;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::storage::entities::ProjectRecord;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint answered with status {status}")]
    Rejected { status: u16 },

    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),
}

/// Body of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub project_id: Arc<str>,
    pub display_name: Arc<str>,
    pub total_minutes: f64,
    pub session_minutes: u64,
    pub timestamp: DateTime<Utc>,
    /// Set when the report was triggered by saving this file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl SessionReport {
    pub fn new(record: &ProjectRecord, session_minutes: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            project_id: record.project_id.clone(),
            display_name: record.display_name.clone(),
            total_minutes: record.total_minutes,
            session_minutes,
            timestamp,
            file: None,
        }
    }
}

/// Outcome of the most recent report.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Synced {
        at: DateTime<Utc>,
    },
    Failed {
        at: DateTime<Utc>,
        reason: String,
    },
}

/// Delivery strategy for reports. Swapping the implementation changes delivery guarantees
/// without touching session tracking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncReporter: Send + Sync {
    /// Starts delivering `report` and returns immediately.
    fn report(&self, report: SessionReport);

    fn status(&self) -> SyncStatus;

    /// Waits up to `wait` for reports still in flight. Whatever is left afterwards is abandoned.
    async fn finalize(&self, wait: Duration);
}

/// Used when no endpoint is configured.
pub struct NoopReporter;

#[async_trait]
impl SyncReporter for NoopReporter {
    fn report(&self, report: SessionReport) {
        tracing::trace!("Not reporting {}, no endpoint configured", report.project_id);
    }

    fn status(&self) -> SyncStatus {
        SyncStatus::Idle
    }

    async fn finalize(&self, _wait: Duration) {}
}
