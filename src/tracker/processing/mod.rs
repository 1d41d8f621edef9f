use anyhow::Result;
use module::EventProcessor;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::events::TrackerEvent;

pub mod context;
pub mod module;

/// Represents the consumer of tracker events. Every transition runs to completion, persistence
/// included, before the next event is taken off the channel.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerEvent>,
    processor: Processor,
    shutdown: CancellationToken,
}

impl<P: EventProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerEvent>, processor: P, shutdown: CancellationToken) -> Self {
        Self {
            receiver,
            processor,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.receiver.recv() => event,
            };

            let Some(event) = event else {
                debug!("All event sources are gone");
                break;
            };
            if event == TrackerEvent::Shutdown {
                info!("Editor asked to shut down");
                break;
            }

            trace!("Processing event {:?}", event);
            match self.processor.process_next(event.clone()).await {
                Ok(_) => {
                    debug!("Processed event {:?}", event)
                }
                Err(e) => {
                    error!("Error processing event {:?}: {e:?}", event)
                }
            }
        }

        self.receiver.close();
        let result = self.processor.finalize().await;
        // Stops input, ticks and display output.
        self.shutdown.cancel();
        result
    }
}
