//! Core enumerations shared by the tool catalog, streams and analysis results.
//!
//! Canonical wire spellings for the tool protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tool category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Acquisition,
    Analysis,
    Control,
    Streaming,
    Workflow,
    Assist,
}

/// Risk semantic for tool execution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSemantic {
    /// Observes the instrument without changing its state.
    ReadOnly,
    /// Changes optics, stage or acquisition state.
    Write,
}

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Stream session status. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Started,
    Stopped,
}

impl StreamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamStatus::Started => "started",
            StreamStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature classes the detection strategy can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Particles,
    Defects,
    Interfaces,
}

impl FeatureType {
    pub const ALL: [FeatureType; 3] = [
        FeatureType::Particles,
        FeatureType::Defects,
        FeatureType::Interfaces,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureType::Particles => "particles",
            FeatureType::Defects => "defects",
            FeatureType::Interfaces => "interfaces",
        }
    }
}

impl FromStr for FeatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "particles" => Ok(FeatureType::Particles),
            "defects" => Ok(FeatureType::Defects),
            "interfaces" => Ok(FeatureType::Interfaces),
            other => Err(format!(
                "unknown feature type '{}', expected one of: particles, defects, interfaces",
                other
            )),
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a focus optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusStatus {
    /// Quality threshold reached.
    OptimalFocus,
    /// Step budget exhausted below the threshold.
    BestPossible,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_type_parse() {
        assert_eq!("defects".parse::<FeatureType>().unwrap(), FeatureType::Defects);
        assert!("dust".parse::<FeatureType>().is_err());
    }

    #[test]
    fn test_stream_status_wire_spelling() {
        assert_eq!(
            serde_json::to_value(StreamStatus::Stopped).unwrap(),
            serde_json::json!("stopped")
        );
    }

    #[test]
    fn test_focus_status_wire_spelling() {
        assert_eq!(
            serde_json::to_value(FocusStatus::OptimalFocus).unwrap(),
            serde_json::json!("optimal_focus")
        );
    }
}
