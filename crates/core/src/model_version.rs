#![forbid(unsafe_code)]

/// How an incoming snapshot's model version relates to the version this client runs.
///
/// The major component of a version is its integer part (`3.2` is major 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelVersionCheck {
    Equal,
    /// Incoming data is newer within the same major; readable as-is.
    RemoteMinorAhead,
    /// Incoming data was produced by a newer major model and cannot be down-migrated.
    RemoteMajorAhead,
    MinorUpdate,
    MajorUpdate,
}

impl ModelVersionCheck {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::RemoteMinorAhead => "remote_minor_ahead",
            Self::RemoteMajorAhead => "remote_major_ahead",
            Self::MinorUpdate => "minor_update",
            Self::MajorUpdate => "major_update",
        }
    }

    pub fn needs_migration(self) -> bool {
        matches!(self, Self::MinorUpdate | Self::MajorUpdate)
    }
}

pub fn major(version: f64) -> i64 {
    version.floor() as i64
}

pub fn check(client: f64, incoming: f64) -> ModelVersionCheck {
    if incoming == client {
        return ModelVersionCheck::Equal;
    }
    if incoming > client {
        if major(incoming) > major(client) {
            ModelVersionCheck::RemoteMajorAhead
        } else {
            ModelVersionCheck::RemoteMinorAhead
        }
    } else if major(client) > major(incoming) {
        ModelVersionCheck::MajorUpdate
    } else {
        ModelVersionCheck::MinorUpdate
    }
}
