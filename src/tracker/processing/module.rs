use anyhow::Result;

use crate::tracker::events::TrackerEvent;

/// Represents an event processor. The processing loop hands it events one at a time, so an
/// implementation never sees two events concurrently.
pub trait EventProcessor {
    fn process_next(&mut self, event: TrackerEvent) -> impl std::future::Future<Output = Result<()>>;

    /// Runs once after the last event, whatever the reason the loop stopped.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
