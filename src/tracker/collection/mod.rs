//! Producers of [TrackerEvent](super::events::TrackerEvent)s: the editor's json lines and the
//! periodic tick.

pub mod input;
pub mod ticker;
