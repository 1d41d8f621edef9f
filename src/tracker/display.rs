use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::watch,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::utils::time::format_minutes;

use super::sync::SyncStatus;

/// What the editor shows in its status bar.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SessionDisplay {
    pub project_id: Option<Arc<str>>,
    pub display_name: Option<Arc<str>>,
    pub session_minutes: u64,
    pub total_minutes: f64,
    pub sync: SyncStatus,
}

impl SessionDisplay {
    pub fn status_text(&self) -> String {
        let mut text = match &self.display_name {
            Some(name) => format!(
                "{name} | session {} | total {}",
                format_minutes(self.session_minutes as f64),
                format_minutes(self.total_minutes)
            ),
            None => "No project".to_owned(),
        };
        if matches!(self.sync, SyncStatus::Failed { .. }) {
            text.push_str(" | sync failed");
        }
        text
    }
}

#[derive(Serialize)]
struct DisplayLine<'a> {
    #[serde(flatten)]
    display: &'a SessionDisplay,
    text: String,
}

/// Writes every new display value as one json line until shutdown or until the processing side
/// goes away.
pub async fn emit_display(
    mut displays: watch::Receiver<SessionDisplay>,
    mut output: impl AsyncWrite + Unpin,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let mut line = {
            let display = displays.borrow_and_update();
            serde_json::to_vec(&DisplayLine {
                display: &*display,
                text: display.status_text(),
            })?
        };
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;

        // The final display is published right before cancellation and must still be written.
        tokio::select! {
            biased;
            changed = displays.changed() => {
                if changed.is_err() {
                    debug!("Display source closed");
                    return Ok(());
                }
            }
            _ = shutdown.cancelled() => return Ok(()),
        }
    }
}
