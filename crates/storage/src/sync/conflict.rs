#![forbid(unsafe_code)]

use crate::time::ts_ms_to_rfc3339;
use pf_core::clock::ClockTriple;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictResolution {
    UseLocal,
    UseRemote,
    /// Do nothing now; the divergence is still there on the next attempt.
    Cancel,
}

impl ConflictResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseLocal => "local",
            Self::UseRemote => "remote",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "local" => Some(Self::UseLocal),
            "remote" => Some(Self::UseRemote),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// The diverged clocks as handed to whoever decides. Raw values drive the decision; the
/// RFC 3339 renderings are for display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictView {
    pub remote: u64,
    pub local: u64,
    pub last_sync: u64,
    pub remote_at: String,
    pub local_at: String,
    pub last_sync_at: String,
}

impl ConflictView {
    pub fn new(clock: ClockTriple) -> Self {
        Self {
            remote: clock.remote,
            local: clock.local,
            last_sync: clock.last_sync,
            remote_at: ts_ms_to_rfc3339(clock.remote),
            local_at: ts_ms_to_rfc3339(clock.local),
            last_sync_at: ts_ms_to_rfc3339(clock.last_sync),
        }
    }
}

/// Asks for a side. `None` means the question was dismissed.
pub trait ConflictPrompt {
    fn present(&mut self, view: &ConflictView) -> Option<ConflictResolution>;
}

impl<F> ConflictPrompt for F
where
    F: FnMut(&ConflictView) -> Option<ConflictResolution>,
{
    fn present(&mut self, view: &ConflictView) -> Option<ConflictResolution> {
        self(view)
    }
}

pub fn present_conflict(
    prompt: &mut (impl ConflictPrompt + ?Sized),
    view: &ConflictView,
) -> ConflictResolution {
    prompt.present(view).unwrap_or(ConflictResolution::Cancel)
}
