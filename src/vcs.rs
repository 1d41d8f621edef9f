//! Turns a workspace folder into a project identifier.

use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_REMOTE: &str = "origin";

/// Finds the identifier of the project checked out at a path. Implementations must be free of
/// side effects: the same folder can be resolved any number of times.
#[async_trait]
pub trait ProjectIdResolver: Send + Sync {
    /// `None` when the folder has no identifier. That is a normal outcome, not an error.
    async fn resolve(&self, workspace: &Path) -> Option<String>;
}

/// Uses the url of a git remote as the identifier.
pub struct GitRemoteResolver {
    remote: String,
}

impl GitRemoteResolver {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
        }
    }
}

impl Default for GitRemoteResolver {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE)
    }
}

#[async_trait]
impl ProjectIdResolver for GitRemoteResolver {
    async fn resolve(&self, workspace: &Path) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(workspace)
            .args(["remote", "get-url", self.remote.as_str()])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let url = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                (!url.is_empty()).then_some(url)
            }
            Ok(output) => {
                debug!("No {} remote for {workspace:?} ({})", self.remote, output.status);
                None
            }
            Err(e) => {
                debug!("Couldn't run git for {workspace:?}: {e}");
                None
            }
        }
    }
}

/// Display name for a workspace folder: its last path component.
pub fn workspace_name(workspace: &Path) -> String {
    workspace
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| workspace.to_string_lossy().into_owned())
}
