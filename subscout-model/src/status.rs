use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Lifecycle of a scan.
///
/// `Pending -> Running -> {Finished, Error, Cancelled}`. A pending scan may
/// also jump straight to `Error` (nothing to run) or `Cancelled`. Terminal
/// states never transition again.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Running,
    Finished,
    Error,
    Cancelled,
}

impl ScanStatus {
    pub const ALL: [ScanStatus; 5] = [
        ScanStatus::Pending,
        ScanStatus::Running,
        ScanStatus::Finished,
        ScanStatus::Error,
        ScanStatus::Cancelled,
    ];

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Finished => "finished",
            ScanStatus::Error => "error",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Finished | ScanStatus::Error | ScanStatus::Cancelled
        )
    }

    /// `Running -> Running` is accepted so a repeated start is a no-op
    /// instead of an error.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        match (self, next) {
            (Pending, Running | Error | Cancelled) => true,
            (Running, Running | Finished | Error | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown scan status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

impl FromStr for ScanStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ScanStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}
