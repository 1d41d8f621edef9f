use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time accounting for one project, as stored on disk.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    /// Usually a git remote url. Never changes once the record exists.
    pub project_id: Arc<str>,
    pub display_name: Arc<str>,
    pub total_minutes: f64,
    pub last_opened: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn new(project_id: Arc<str>, display_name: Arc<str>, now: DateTime<Utc>) -> Self {
        Self {
            project_id,
            display_name,
            total_minutes: 0.,
            last_opened: now,
        }
    }
}

/// Top level shape of the persisted document.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ProjectsDocument {
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}
