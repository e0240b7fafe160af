//! Normalized view of a model download.

use serde::{Deserialize, Serialize};

/// Where a pull currently is, as inferred from the server's status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPhase {
    Initializing,
    Pulling,
    Resolving,
    Downloading,
    Verifying,
    Completed,
    Errored,
    Incomplete,
}

impl PullPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PullPhase::Completed | PullPhase::Errored | PullPhase::Incomplete
        )
    }
}

/// How a pull ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PullTerminal {
    #[default]
    None,
    Success,
    Error,
    /// The stream closed without a success or error marker.
    Incomplete,
}

/// Snapshot handed to the UI after every tracker transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PullProgressState {
    /// 0-100, never decreases within one pull
    pub percentage: u8,
    pub status_text: String,
    pub terminal: PullTerminal,
    pub last_raw_status: String,
}
