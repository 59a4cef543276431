//! TTL presets observed across the wrapper tools

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Freshness window classes
///
/// Different tools want very different windows on the same kind of entry,
/// so these are applied at read time, never baked into a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlPreset {
    /// Live process / network / container metrics
    LiveMetrics,
    /// Code analysis results (symbols, imports, complexity)
    Analysis,
    /// Build, lint and test output
    Build,
    /// Dependency and security scans
    SecurityScan,
}

impl TtlPreset {
    pub fn as_secs(&self) -> u64 {
        match self {
            Self::LiveMetrics => 60,
            Self::Analysis => 300,
            Self::Build => 3_600,
            Self::SecurityScan => 86_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveMetrics => "live_metrics",
            Self::Analysis => "analysis",
            Self::Build => "build",
            Self::SecurityScan => "security_scan",
        }
    }
}

impl FromStr for TtlPreset {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "live_metrics" | "metrics" => Ok(Self::LiveMetrics),
            "analysis" => Ok(Self::Analysis),
            "build" => Ok(Self::Build),
            "security_scan" | "security" => Ok(Self::SecurityScan),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown TTL preset: {}",
                other
            ))),
        }
    }
}
