use anyhow::Result;
use tokio::{io::AsyncBufRead, io::AsyncBufReadExt, sync::mpsc};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::tracker::events::TrackerEvent;

/// Reads editor events, one json object per line. The end of the input means the editor is gone
/// and is forwarded as [TrackerEvent::Shutdown].
pub struct InputModule<R> {
    reader: R,
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
}

impl<R: AsyncBufRead + Unpin> InputModule<R> {
    pub fn new(reader: R, next: mpsc::Sender<TrackerEvent>, shutdown: CancellationToken) -> Self {
        Self {
            reader,
            next,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<()> {
        let mut lines = LinesStream::new(self.reader.lines());
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                line = lines.next() => line,
            };

            let event = match line {
                Some(Ok(line)) => match parse_line(&line) {
                    Some(event) => event,
                    None => continue,
                },
                Some(Err(e)) => {
                    error!("Failed to read editor input, shutting down: {e}");
                    TrackerEvent::Shutdown
                }
                None => {
                    info!("Editor input closed");
                    TrackerEvent::Shutdown
                }
            };

            let is_shutdown = event == TrackerEvent::Shutdown;
            if self.next.send(event).await.is_err() {
                debug!("Processing stopped, dropping input");
                return Ok(());
            }
            if is_shutdown {
                return Ok(());
            }
        }
    }
}

fn parse_line(line: &str) -> Option<TrackerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<TrackerEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Ignoring malformed editor message {line}: {e}");
            None
        }
    }
}
