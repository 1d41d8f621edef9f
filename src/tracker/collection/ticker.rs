use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{tracker::events::TrackerEvent, utils::clock::Clock};

/// Asks the processing loop to refresh the display at a fixed frequency.
pub struct TickerModule {
    next: mpsc::Sender<TrackerEvent>,
    shutdown: CancellationToken,
    tick_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl TickerModule {
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        shutdown: CancellationToken,
        tick_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            shutdown,
            tick_frequency,
            time_provider,
        }
    }

    /// Executes the ticker event loop.
    pub async fn run(self) -> Result<()> {
        let mut tick_point = self.time_provider.instant();
        loop {
            tick_point += self.tick_frequency;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(tick_point) => ()
            }

            match self.next.try_send(TrackerEvent::Tick) {
                Ok(()) => trace!("Sent tick"),
                // A newer tick will follow, dropping this one loses nothing.
                Err(TrySendError::Full(_)) => debug!("Event queue is full, skipping tick"),
                Err(TrySendError::Closed(_)) => return Ok(()),
            }
        }
    }
}
