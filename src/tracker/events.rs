use std::path::PathBuf;

use serde::Deserialize;

/// Everything the processing loop reacts to. All but [TrackerEvent::Tick] arrive from the editor
/// as json lines tagged with `event`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// The editor already knows the project identifier. `null` means it has none.
    WorkspaceActivated {
        project_id: Option<String>,
        #[serde(default)]
        display_name: String,
    },
    /// The editor only knows the folder; the identifier is resolved by the tracker.
    WorkspaceOpened {
        path: PathBuf,
        #[serde(default)]
        display_name: Option<String>,
    },
    FileSaved {
        file: PathBuf,
    },
    Shutdown,
    #[serde(skip_deserializing)]
    Tick,
}
