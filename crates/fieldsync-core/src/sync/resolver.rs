//! Conflict detection and resolution

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{ConflictDisposition, IncomingRecord, Record};

/// What the engine should do with one incoming version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    AcceptRemote,
    KeepLocal,
    /// Both sides changed since the last sync; settled by [`ConflictPolicy`]
    Conflict,
}

/// How a [`Resolution::Conflict`] is settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Unsynced local edits always survive
    #[default]
    LocalWins,
    /// The strictly newer `updated_at` survives; ties keep local
    NewestWins,
}

impl ConflictPolicy {
    /// Settle a conflict between `local` and `remote`
    pub const fn settle(self, local: &Record, remote: &IncomingRecord) -> ConflictDisposition {
        match self {
            Self::NewestWins if remote.updated_at > local.updated_at => {
                ConflictDisposition::AcceptedRemote
            }
            Self::LocalWins | Self::NewestWins => ConflictDisposition::KeptLocal,
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalWins => write!(f, "local_wins"),
            Self::NewestWins => write!(f, "newest_wins"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_wins" => Ok(Self::LocalWins),
            "newest_wins" => Ok(Self::NewestWins),
            other => Err(Error::Config(format!(
                "unknown conflict policy {other:?} (expected local_wins or newest_wins)"
            ))),
        }
    }
}

/// Decide what to do with `remote` given the matching local row, if any.
///
/// Pure: reads nothing but its arguments.
pub fn resolve(local: Option<&Record>, remote: &IncomingRecord, local_device: &str) -> Resolution {
    if remote.origin_device == local_device {
        return Resolution::KeepLocal;
    }
    let Some(local) = local else {
        return Resolution::AcceptRemote;
    };
    if local.is_dirty() {
        return Resolution::Conflict;
    }
    if remote.updated_at > local.updated_at {
        Resolution::AcceptRemote
    } else {
        Resolution::KeepLocal
    }
}
