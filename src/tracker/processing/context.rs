use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    tracker::{
        display::SessionDisplay,
        events::TrackerEvent,
        session::{Activation, ClosedSession, SessionTracker},
        storage::project_store::{ProjectStorage, ProjectStore},
        sync::{SessionReport, SyncReporter},
    },
    utils::clock::Clock,
    vcs::{workspace_name, ProjectIdResolver},
};

use super::module::EventProcessor;

/// Everything a running tracker owns. Built once at start, torn down through
/// [TrackerContext::shutdown].
pub struct TrackerContext<S: ProjectStorage> {
    store: ProjectStore<S>,
    tracker: SessionTracker,
    reporter: Box<dyn SyncReporter>,
    resolver: Box<dyn ProjectIdResolver>,
    clock: Box<dyn Clock>,
    displays: watch::Sender<SessionDisplay>,
    flush_timeout: Duration,
}

impl<S: ProjectStorage> TrackerContext<S> {
    pub fn new(
        store: ProjectStore<S>,
        reporter: Box<dyn SyncReporter>,
        resolver: Box<dyn ProjectIdResolver>,
        clock: Box<dyn Clock>,
        displays: watch::Sender<SessionDisplay>,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tracker: SessionTracker::new(),
            reporter,
            resolver,
            clock,
            displays,
            flush_timeout,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn store(&self) -> &ProjectStore<S> {
        &self.store
    }

    /// Session and running total as of now. Reads only.
    pub fn current_display(&self) -> SessionDisplay {
        let now = self.clock.time();
        let sync = self.reporter.status();
        let Some(session) = self.tracker.active_session() else {
            return SessionDisplay {
                sync,
                ..Default::default()
            };
        };

        let record = self.store.get(&session.project_id);
        let session_minutes = self.tracker.session_minutes(now);
        SessionDisplay {
            project_id: Some(session.project_id.clone()),
            display_name: Some(
                record
                    .map(|r| r.display_name.clone())
                    .unwrap_or_else(|| session.project_id.clone()),
            ),
            session_minutes,
            total_minutes: record.map_or(0., |r| r.total_minutes) + session_minutes as f64,
            sync,
        }
    }

    pub async fn workspace_activated(&mut self, project_id: Option<String>, display_name: &str) {
        let now = self.clock.time();
        let project_id: Option<Arc<str>> = project_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| id.trim().into());

        match self.tracker.activate(project_id, now) {
            Activation::Unchanged => debug!("Workspace activation changed nothing"),
            Activation::Switched { closed, started } => {
                if let Some(closed) = closed {
                    self.commit(closed).await;
                }
                match started {
                    Some(session) => {
                        self.store
                            .find_or_create(&session.project_id, display_name, now)
                            .await;
                        info!("Started session for {}", session.project_id);
                    }
                    None => info!("Workspace has no project identifier, tracker is idle"),
                }
            }
        }
        self.publish_display();
    }

    pub async fn workspace_opened(&mut self, path: &Path, display_name: Option<String>) {
        let project_id = self.resolver.resolve(path).await;
        let display_name = display_name.unwrap_or_else(|| workspace_name(path));
        self.workspace_activated(project_id, &display_name).await
    }

    /// Reports the running total of the active project. Saving while idle reports nothing.
    pub fn file_saved(&self, file: &Path) {
        let Some(session) = self.tracker.active_session() else {
            debug!("Saved {file:?} without an active project");
            return;
        };
        let Some(record) = self.store.get(&session.project_id) else {
            return;
        };

        let now = self.clock.time();
        let session_minutes = self.tracker.session_minutes(now);
        let mut report = SessionReport::new(record, session_minutes, now);
        report.total_minutes += session_minutes as f64;
        report.file = Some(file.to_string_lossy().into_owned());
        debug!("Saved {file:?}, reporting {}", session.project_id);
        self.reporter.report(report);
    }

    /// Closes the active session and gives pending reports a bounded amount of time.
    pub async fn shutdown(&mut self) {
        let now = self.clock.time();
        if let Some(closed) = self.tracker.close(now) {
            self.commit(closed).await;
        }
        self.publish_display();
        self.reporter.finalize(self.flush_timeout).await;
    }

    async fn commit(&mut self, closed: ClosedSession) {
        let record = self
            .store
            .add_minutes(&closed.project_id, closed.elapsed_minutes, closed.ended_at)
            .await;
        info!(
            "Closed session for {} after {} minutes, {} in total",
            record.project_id, closed.elapsed_minutes, record.total_minutes
        );
        let report = SessionReport::new(record, closed.elapsed_minutes, closed.ended_at);
        self.reporter.report(report);
    }

    fn publish_display(&self) {
        self.displays.send_replace(self.current_display());
    }
}

impl<S: ProjectStorage> EventProcessor for TrackerContext<S> {
    async fn process_next(&mut self, event: TrackerEvent) -> Result<()> {
        match event {
            TrackerEvent::WorkspaceActivated {
                project_id,
                display_name,
            } => self.workspace_activated(project_id, &display_name).await,
            TrackerEvent::WorkspaceOpened { path, display_name } => {
                self.workspace_opened(&path, display_name).await
            }
            TrackerEvent::FileSaved { file } => self.file_saved(&file),
            TrackerEvent::Tick => self.publish_display(),
            TrackerEvent::Shutdown => self.shutdown().await,
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.shutdown().await;
        Ok(())
    }
}
