//! Keeps track of how long each project has been open in an editor.
//! The editor talks to a long running `projclock serve` process through json lines; time is
//! accounted per project identifier (usually a git remote url), saved to a local file and
//! optionally reported to a remote service.
//!

pub mod cli;
pub mod tracker;
pub mod utils;
pub mod vcs;
