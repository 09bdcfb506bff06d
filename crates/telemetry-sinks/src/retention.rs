//! File retention policies and output path resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use simracing_telemetry_core::Game;
use simracing_telemetry_errors::{SinkError, SinkResult};

const CSV_EXTENSION: &str = "csv";

/// How output files roll over over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    /// One file forever.
    #[default]
    None,
    /// One file per calendar day inside a directory.
    Daily,
}

impl Retention {
    pub const fn as_str(self) -> &'static str {
        match self {
            Retention::None => "none",
            Retention::Daily => "daily",
        }
    }
}

impl fmt::Display for Retention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Retention {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Retention::None),
            "daily" => Ok(Retention::Daily),
            _ => Err(SinkError::InvalidRetention(s.to_owned())),
        }
    }
}

/// Resolve the file a snapshot received on `date` must be written to.
///
/// - `Daily`: `base` must be an existing directory; the file is
///   `{game}-daily-{YYYY-MM-DD}.csv` inside it.
/// - `None`: a path ending in `.csv` is used as is, provided its parent
///   directory exists; an existing directory gets `{game}.csv` appended.
///
/// # Errors
///
/// Returns [`SinkError::InvalidPath`] when `base` does not satisfy the rules
/// of the policy.
pub fn resolve_target_path(
    base: &Path,
    retention: Retention,
    game: Game,
    date: NaiveDate,
) -> SinkResult<PathBuf> {
    match retention {
        Retention::Daily => {
            if !base.is_dir() {
                return Err(SinkError::InvalidPath(base.to_path_buf()));
            }
            Ok(base.join(format!(
                "{}-daily-{}.{CSV_EXTENSION}",
                game.id(),
                date.format("%Y-%m-%d")
            )))
        }
        Retention::None => {
            if base.is_dir() {
                return Ok(base.join(format!("{}.{CSV_EXTENSION}", game.id())));
            }
            let is_csv = base
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(CSV_EXTENSION));
            let parent_exists = match base.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
                _ => true,
            };
            if is_csv && parent_exists {
                Ok(base.to_path_buf())
            } else {
                Err(SinkError::InvalidPath(base.to_path_buf()))
            }
        }
    }
}
