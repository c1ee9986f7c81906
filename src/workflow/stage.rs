//! Stage and Status Types
//!
//! Closed sets for every stage/status value in the workflow. The storage
//! layer persists the `as_str()` forms; decoding goes through `parse()` and
//! fails loudly on an unrecognized value instead of silently defaulting.

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// The department currently responsible for a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Reception,
    Nurse,
    Doctor,
    Lab,
    Pharmacy,
    Billing,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reception => "reception",
            Self::Nurse => "nurse",
            Self::Doctor => "doctor",
            Self::Lab => "lab",
            Self::Pharmacy => "pharmacy",
            Self::Billing => "billing",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s {
            "reception" => Ok(Self::Reception),
            "nurse" => Ok(Self::Nurse),
            "doctor" => Ok(Self::Doctor),
            "lab" => Ok(Self::Lab),
            "pharmacy" => Ok(Self::Pharmacy),
            "billing" => Ok(Self::Billing),
            "completed" => Ok(Self::Completed),
            other => Err(WorkflowError::InvalidStage(other.to_string())),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-stage progress marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotRequired,
    Pending,
    InProgress,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s {
            "not_required" => Ok(Self::NotRequired),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(WorkflowError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whole-visit lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Active,
    Completed,
    Cancelled,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(WorkflowError::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority on a lab order. STAT and Urgent items jump the queue
/// regardless of wait time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabPriority {
    // Ordered so that Ord sorts STAT first.
    Stat,
    Urgent,
    Routine,
}

impl LabPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stat => "stat",
            Self::Urgent => "urgent",
            Self::Routine => "routine",
        }
    }

    pub fn parse(s: &str) -> Result<Self, WorkflowError> {
        match s {
            "stat" => Ok(Self::Stat),
            "urgent" => Ok(Self::Urgent),
            "routine" => Ok(Self::Routine),
            other => Err(WorkflowError::InvalidStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            Stage::Reception,
            Stage::Nurse,
            Stage::Doctor,
            Stage::Lab,
            Stage::Pharmacy,
            Stage::Billing,
            Stage::Completed,
        ] {
            assert_eq!(Stage::parse(stage.as_str()).unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage_fails_loudly() {
        let err = Stage::parse("triage").unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStage(s) if s == "triage"));
    }

    #[test]
    fn test_unknown_status_fails_loudly() {
        assert!(StageStatus::parse("Completed").is_err()); // case-sensitive
        assert!(StageStatus::parse("done").is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(LabPriority::Stat < LabPriority::Urgent);
        assert!(LabPriority::Urgent < LabPriority::Routine);
    }
}
