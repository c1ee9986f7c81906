//! Visit Record
//!
//! Durable state for one patient visit: current stage, per-stage status,
//! timestamps. Mutated exclusively through the transition engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{LabPriority, OverallStatus, Stage, StageStatus};

/// One episode of a patient moving through the hospital departments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    /// Unique visit ID
    pub id: Uuid,
    /// Patient this visit belongs to
    pub patient_id: Uuid,

    /// Department currently responsible for the visit
    pub current_stage: Stage,
    pub overall_status: OverallStatus,

    pub reception_status: StageStatus,
    pub nurse_status: StageStatus,
    pub doctor_status: StageStatus,
    pub lab_status: StageStatus,
    pub pharmacy_status: StageStatus,
    pub billing_status: StageStatus,

    /// Priority of the most recent lab order, if any. Honored by the lab
    /// queue projection.
    pub lab_priority: Option<LabPriority>,

    pub reception_completed_at: Option<DateTime<Utc>>,
    pub nurse_completed_at: Option<DateTime<Utc>>,
    pub doctor_completed_at: Option<DateTime<Utc>>,
    pub lab_completed_at: Option<DateTime<Utc>>,
    pub pharmacy_completed_at: Option<DateTime<Utc>>,
    pub billing_completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every persisted write.
    pub version: i64,
}

impl Visit {
    /// Create a new visit at reception check-in. Lab is not required until
    /// the doctor orders a test; every other stage starts pending.
    pub fn check_in(patient_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            current_stage: Stage::Reception,
            overall_status: OverallStatus::Active,
            reception_status: StageStatus::InProgress,
            nurse_status: StageStatus::Pending,
            doctor_status: StageStatus::Pending,
            lab_status: StageStatus::NotRequired,
            pharmacy_status: StageStatus::Pending,
            billing_status: StageStatus::Pending,
            lab_priority: None,
            reception_completed_at: None,
            nurse_completed_at: None,
            doctor_completed_at: None,
            lab_completed_at: None,
            pharmacy_completed_at: None,
            billing_completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Status of a given stage. `Stage::Completed` is the terminal
    /// pseudo-stage and has no status field of its own.
    pub fn status_for(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Reception => self.reception_status,
            Stage::Nurse => self.nurse_status,
            Stage::Doctor => self.doctor_status,
            Stage::Lab => self.lab_status,
            Stage::Pharmacy => self.pharmacy_status,
            Stage::Billing => self.billing_status,
            Stage::Completed => StageStatus::Completed,
        }
    }

    pub(crate) fn set_status(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Reception => self.reception_status = status,
            Stage::Nurse => self.nurse_status = status,
            Stage::Doctor => self.doctor_status = status,
            Stage::Lab => self.lab_status = status,
            Stage::Pharmacy => self.pharmacy_status = status,
            Stage::Billing => self.billing_status = status,
            Stage::Completed => {}
        }
    }

    pub(crate) fn set_completed_at(&mut self, stage: Stage, at: DateTime<Utc>) {
        match stage {
            Stage::Reception => self.reception_completed_at = Some(at),
            Stage::Nurse => self.nurse_completed_at = Some(at),
            Stage::Doctor => self.doctor_completed_at = Some(at),
            Stage::Lab => self.lab_completed_at = Some(at),
            Stage::Pharmacy => self.pharmacy_completed_at = Some(at),
            Stage::Billing => self.billing_completed_at = Some(at),
            Stage::Completed => {}
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_defaults() {
        let visit = Visit::check_in(Uuid::new_v4(), Utc::now());

        assert_eq!(visit.current_stage, Stage::Reception);
        assert_eq!(visit.overall_status, OverallStatus::Active);
        assert_eq!(visit.reception_status, StageStatus::InProgress);
        assert_eq!(visit.lab_status, StageStatus::NotRequired);
        assert!(visit.reception_completed_at.is_none());
        assert_eq!(visit.version, 0);
    }

    #[test]
    fn test_status_for_covers_every_stage() {
        let visit = Visit::check_in(Uuid::new_v4(), Utc::now());
        assert_eq!(visit.status_for(Stage::Nurse), StageStatus::Pending);
        assert_eq!(visit.status_for(Stage::Completed), StageStatus::Completed);
    }
}
