use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::utils::time::elapsed_minutes;

/// A contiguous stretch of time attributed to one project.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub project_id: Arc<str>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Active(Session),
}

/// What a finished session contributes to its project.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedSession {
    pub project_id: Arc<str>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_minutes: u64,
}

/// Result of [SessionTracker::activate].
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// The project was already active. Nothing changed.
    Unchanged,
    /// The tracker moved to a new state. `closed` holds the session that ended, if any.
    Switched {
        closed: Option<ClosedSession>,
        started: Option<Session>,
    },
}

/// Two state machine deciding which project time is attributed to. It never touches storage:
/// the caller merges [ClosedSession]s into records.
#[derive(Debug, Default)]
pub struct SessionTracker {
    state: SessionState,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn active_session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Active(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Makes `project_id` the active project. `None` means the workspace has no identifier, which
    /// leaves the tracker idle.
    pub fn activate(&mut self, project_id: Option<Arc<str>>, now: DateTime<Utc>) -> Activation {
        if let (Some(next), Some(current)) = (&project_id, self.active_session()) {
            if *next == current.project_id {
                return Activation::Unchanged;
            }
        }
        if project_id.is_none() && self.state == SessionState::Idle {
            return Activation::Unchanged;
        }

        let closed = self.close(now);
        let started = project_id.map(|project_id| Session {
            project_id,
            started_at: now,
        });
        if let Some(session) = &started {
            self.state = SessionState::Active(session.clone());
        }
        Activation::Switched { closed, started }
    }

    /// Ends the active session, if there is one. Seconds past the last whole minute are dropped.
    pub fn close(&mut self, now: DateTime<Utc>) -> Option<ClosedSession> {
        match std::mem::take(&mut self.state) {
            SessionState::Active(Session {
                project_id,
                started_at,
            }) => Some(ClosedSession {
                project_id,
                started_at,
                ended_at: now,
                elapsed_minutes: elapsed_minutes(started_at, now),
            }),
            SessionState::Idle => None,
        }
    }

    /// Minutes of the running session, zero while idle. Never mutates.
    pub fn session_minutes(&self, now: DateTime<Utc>) -> u64 {
        self.active_session()
            .map(|session| elapsed_minutes(session.started_at, now))
            .unwrap_or(0)
    }
}
