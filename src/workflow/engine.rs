//! Stage Transition Engine
//!
//! The single authority allowed to change a visit's `current_stage` or any
//! per-stage status. `apply_action` computes the whole handoff (source
//! stage completed, destination stage pending, `current_stage` moved) as
//! one in-memory mutation, so persistence can write it in a single
//! transaction and no half-applied "stuck visit" state can exist.
//!
//! Re-submitting a completion action on a visit already advanced past that
//! stage is a no-op returning the current state, not an error: department
//! UIs retry on double-click.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stage::{LabPriority, OverallStatus, Stage, StageStatus};
use super::visit::Visit;
use crate::error::WorkflowError;

/// A department action requesting a stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum VisitAction {
    /// Reception finishes check-in; visit moves to the nurse queue.
    CompleteCheckIn,
    /// Nurse records vitals; visit moves to the doctor queue.
    RecordVitals,
    /// Doctor orders a lab test; visit moves to the lab queue while the
    /// consultation stays open.
    OrderLabTest { priority: LabPriority },
    /// Lab submits a result; visit loops back to the doctor queue.
    SubmitLabResult,
    /// Doctor closes the consultation; visit moves to pharmacy, or
    /// straight to billing when nothing was prescribed.
    CompleteConsultation { needs_pharmacy: bool },
    /// Pharmacy finishes dispensing; visit moves to billing.
    CompleteDispensing,
    /// Invoice fully paid; visit completes. Normally fired by the payment
    /// applier rather than called directly.
    CompleteBilling,
    /// Abort the visit from any non-terminal stage.
    Cancel,
}

impl VisitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteCheckIn => "complete_check_in",
            Self::RecordVitals => "record_vitals",
            Self::OrderLabTest { .. } => "order_lab_test",
            Self::SubmitLabResult => "submit_lab_result",
            Self::CompleteConsultation { .. } => "complete_consultation",
            Self::CompleteDispensing => "complete_dispensing",
            Self::CompleteBilling => "complete_billing",
            Self::Cancel => "cancel",
        }
    }
}

/// Outcome of applying an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The visit advanced; both stage writes happened in this mutation.
    Advanced { from: Stage, to: Stage },
    /// The visit was cancelled in place.
    Cancelled { at_stage: Stage },
    /// Idempotent retry of an action the visit has already moved past.
    AlreadyApplied,
}

/// Validate and apply a department action against the current visit state.
///
/// On success the visit is mutated to its post-transition state and the
/// caller is expected to persist it atomically. On error the visit is
/// left untouched.
pub fn apply_action(
    visit: &mut Visit,
    action: VisitAction,
    now: DateTime<Utc>,
) -> Result<Applied, WorkflowError> {
    if visit.is_terminal() {
        // A cancelled visit absorbs repeated cancel clicks quietly.
        if action == VisitAction::Cancel && visit.overall_status == OverallStatus::Cancelled {
            return Ok(Applied::AlreadyApplied);
        }
        return Err(WorkflowError::VisitNotActive {
            visit_id: visit.id,
            status: visit.overall_status.to_string(),
        });
    }

    let applied = match action {
        VisitAction::Cancel => {
            visit.overall_status = OverallStatus::Cancelled;
            visit.updated_at = now;
            Applied::Cancelled {
                at_stage: visit.current_stage,
            }
        }
        VisitAction::CompleteCheckIn => {
            complete_and_advance(visit, action, Stage::Reception, Stage::Nurse, now)?
        }
        VisitAction::RecordVitals => {
            complete_and_advance(visit, action, Stage::Nurse, Stage::Doctor, now)?
        }
        VisitAction::OrderLabTest { priority } => order_lab_test(visit, priority, now)?,
        VisitAction::SubmitLabResult => submit_lab_result(visit, now)?,
        VisitAction::CompleteConsultation { needs_pharmacy } => {
            complete_consultation(visit, needs_pharmacy, now)?
        }
        VisitAction::CompleteDispensing => {
            complete_and_advance(visit, action, Stage::Pharmacy, Stage::Billing, now)?
        }
        VisitAction::CompleteBilling => complete_billing(visit, now)?,
    };

    debug!(
        visit_id = %visit.id,
        action = action.as_str(),
        stage = %visit.current_stage,
        "visit action applied"
    );
    Ok(applied)
}

/// The common forward edge: source stage completes, destination opens,
/// `current_stage` moves. One mutation, no intermediate state.
fn complete_and_advance(
    visit: &mut Visit,
    action: VisitAction,
    source: Stage,
    dest: Stage,
    now: DateTime<Utc>,
) -> Result<Applied, WorkflowError> {
    if visit.current_stage != source {
        // Already moved past this stage: retry no-op.
        if visit.status_for(source) == StageStatus::Completed {
            return Ok(Applied::AlreadyApplied);
        }
        return Err(invalid(visit, action, dest));
    }

    visit.set_status(source, StageStatus::Completed);
    visit.set_completed_at(source, now);
    visit.set_status(dest, StageStatus::Pending);
    visit.current_stage = dest;
    visit.updated_at = now;

    Ok(Applied::Advanced {
        from: source,
        to: dest,
    })
}

/// Doctor orders a lab test. The consultation stays open (doctor status
/// remains in-progress) while the visit sits in the lab queue.
fn order_lab_test(
    visit: &mut Visit,
    priority: LabPriority,
    now: DateTime<Utc>,
) -> Result<Applied, WorkflowError> {
    match visit.current_stage {
        Stage::Lab => Ok(Applied::AlreadyApplied),
        Stage::Doctor => {
            visit.set_status(Stage::Doctor, StageStatus::InProgress);
            visit.set_status(Stage::Lab, StageStatus::Pending);
            visit.lab_priority = Some(priority);
            visit.current_stage = Stage::Lab;
            visit.updated_at = now;
            Ok(Applied::Advanced {
                from: Stage::Doctor,
                to: Stage::Lab,
            })
        }
        _ => Err(invalid(
            visit,
            VisitAction::OrderLabTest { priority },
            Stage::Lab,
        )),
    }
}

/// Lab submits a result: the only backward edge. The doctor queue entry
/// reopens for the same visit, so re-entry into an already-visited stage
/// must be legal here.
fn submit_lab_result(visit: &mut Visit, now: DateTime<Utc>) -> Result<Applied, WorkflowError> {
    match visit.current_stage {
        Stage::Lab => {
            visit.set_status(Stage::Lab, StageStatus::Completed);
            visit.set_completed_at(Stage::Lab, now);
            visit.set_status(Stage::Doctor, StageStatus::Pending);
            visit.current_stage = Stage::Doctor;
            visit.updated_at = now;
            Ok(Applied::Advanced {
                from: Stage::Lab,
                to: Stage::Doctor,
            })
        }
        // Result already submitted and the visit is back with the doctor.
        Stage::Doctor if visit.lab_status == StageStatus::Completed => Ok(Applied::AlreadyApplied),
        _ => Err(invalid(visit, VisitAction::SubmitLabResult, Stage::Doctor)),
    }
}

fn complete_consultation(
    visit: &mut Visit,
    needs_pharmacy: bool,
    now: DateTime<Utc>,
) -> Result<Applied, WorkflowError> {
    let action = VisitAction::CompleteConsultation { needs_pharmacy };
    if visit.current_stage != Stage::Doctor {
        if visit.doctor_status == StageStatus::Completed {
            return Ok(Applied::AlreadyApplied);
        }
        return Err(invalid(visit, action, Stage::Pharmacy));
    }

    let dest = if needs_pharmacy {
        Stage::Pharmacy
    } else {
        // Nothing prescribed: pharmacy is skipped outright.
        visit.set_status(Stage::Pharmacy, StageStatus::NotRequired);
        Stage::Billing
    };

    visit.set_status(Stage::Doctor, StageStatus::Completed);
    visit.set_completed_at(Stage::Doctor, now);
    visit.set_status(dest, StageStatus::Pending);
    visit.current_stage = dest;
    visit.updated_at = now;

    Ok(Applied::Advanced {
        from: Stage::Doctor,
        to: dest,
    })
}

fn complete_billing(visit: &mut Visit, now: DateTime<Utc>) -> Result<Applied, WorkflowError> {
    if visit.current_stage != Stage::Billing {
        if visit.billing_status == StageStatus::Completed {
            return Ok(Applied::AlreadyApplied);
        }
        return Err(invalid(visit, VisitAction::CompleteBilling, Stage::Completed));
    }

    visit.set_status(Stage::Billing, StageStatus::Completed);
    visit.set_completed_at(Stage::Billing, now);
    visit.current_stage = Stage::Completed;
    visit.overall_status = OverallStatus::Completed;
    visit.updated_at = now;

    Ok(Applied::Advanced {
        from: Stage::Billing,
        to: Stage::Completed,
    })
}

/// Build an `InvalidTransition` naming the specific blocking condition, so
/// department staff can see which upstream step to go fix.
fn invalid(visit: &Visit, action: VisitAction, to: Stage) -> WorkflowError {
    let blocked_on = match visit.current_stage {
        Stage::Reception => "check-in not complete".to_string(),
        Stage::Nurse => "vitals not yet recorded".to_string(),
        Stage::Doctor => "consultation not complete".to_string(),
        Stage::Lab => "lab result not yet submitted".to_string(),
        Stage::Pharmacy => "dispensing not complete".to_string(),
        Stage::Billing => "invoice not fully paid".to_string(),
        Stage::Completed => "visit already completed".to_string(),
    };
    WorkflowError::InvalidTransition {
        from: format!(
            "{} ({})",
            visit.current_stage,
            visit.status_for(visit.current_stage)
        ),
        to: format!("{} via {}", to, action.as_str()),
        blocked_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn active_visit() -> Visit {
        Visit::check_in(Uuid::new_v4(), Utc::now())
    }

    fn walk_to_doctor(visit: &mut Visit) {
        apply_action(visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
        apply_action(visit, VisitAction::RecordVitals, Utc::now()).unwrap();
    }

    #[test]
    fn test_full_forward_walk() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);
        assert_eq!(visit.current_stage, Stage::Doctor);
        assert_eq!(visit.reception_status, StageStatus::Completed);
        assert!(visit.reception_completed_at.is_some());

        apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: true,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(visit.current_stage, Stage::Pharmacy);

        apply_action(&mut visit, VisitAction::CompleteDispensing, Utc::now()).unwrap();
        assert_eq!(visit.current_stage, Stage::Billing);

        apply_action(&mut visit, VisitAction::CompleteBilling, Utc::now()).unwrap();
        assert_eq!(visit.current_stage, Stage::Completed);
        assert_eq!(visit.overall_status, OverallStatus::Completed);
    }

    #[test]
    fn test_current_stage_status_never_completed_while_active() {
        // Invariant check after every step of a full walk.
        let mut visit = active_visit();
        let actions = [
            VisitAction::CompleteCheckIn,
            VisitAction::RecordVitals,
            VisitAction::OrderLabTest {
                priority: LabPriority::Routine,
            },
            VisitAction::SubmitLabResult,
            VisitAction::CompleteConsultation {
                needs_pharmacy: false,
            },
        ];
        for action in actions {
            apply_action(&mut visit, action, Utc::now()).unwrap();
            if visit.overall_status == OverallStatus::Active {
                assert_ne!(
                    visit.status_for(visit.current_stage),
                    StageStatus::Completed,
                    "stage {} completed while current",
                    visit.current_stage
                );
            }
        }
    }

    #[test]
    fn test_lab_loop_back_reopens_doctor() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);

        apply_action(
            &mut visit,
            VisitAction::OrderLabTest {
                priority: LabPriority::Urgent,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(visit.current_stage, Stage::Lab);
        assert_eq!(visit.doctor_status, StageStatus::InProgress);
        assert_eq!(visit.lab_priority, Some(LabPriority::Urgent));

        let applied = apply_action(&mut visit, VisitAction::SubmitLabResult, Utc::now()).unwrap();
        assert_eq!(
            applied,
            Applied::Advanced {
                from: Stage::Lab,
                to: Stage::Doctor
            }
        );
        // Back with the doctor, not pharmacy; consultation reopened.
        assert_eq!(visit.current_stage, Stage::Doctor);
        assert_eq!(visit.doctor_status, StageStatus::Pending);
        assert_eq!(visit.lab_status, StageStatus::Completed);
        assert!(visit.lab_completed_at.is_some());
    }

    #[test]
    fn test_second_lab_order_after_loop_back() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);
        apply_action(
            &mut visit,
            VisitAction::OrderLabTest {
                priority: LabPriority::Routine,
            },
            Utc::now(),
        )
        .unwrap();
        apply_action(&mut visit, VisitAction::SubmitLabResult, Utc::now()).unwrap();

        // Doctor can order again; lab reopens.
        apply_action(
            &mut visit,
            VisitAction::OrderLabTest {
                priority: LabPriority::Stat,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(visit.current_stage, Stage::Lab);
        assert_eq!(visit.lab_status, StageStatus::Pending);
        assert_eq!(visit.lab_priority, Some(LabPriority::Stat));
    }

    #[test]
    fn test_skip_pharmacy_routes_to_billing() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);

        apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: false,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(visit.current_stage, Stage::Billing);
        assert_eq!(visit.pharmacy_status, StageStatus::NotRequired);
    }

    #[test]
    fn test_double_click_is_noop() {
        let mut visit = active_visit();
        apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
        let snapshot = visit.clone();

        let applied = apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
        assert_eq!(applied, Applied::AlreadyApplied);
        assert_eq!(visit.current_stage, snapshot.current_stage);
        assert_eq!(visit.updated_at, snapshot.updated_at);
    }

    #[test]
    fn test_consultation_retry_after_advance_is_noop() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);
        apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: true,
            },
            Utc::now(),
        )
        .unwrap();

        let applied = apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: true,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(applied, Applied::AlreadyApplied);
        assert_eq!(visit.current_stage, Stage::Pharmacy);
    }

    #[test]
    fn test_pharmacy_action_at_reception_is_invalid() {
        let mut visit = active_visit();
        let before = visit.clone();

        let err = apply_action(&mut visit, VisitAction::CompleteDispensing, Utc::now());
        assert!(matches!(
            err,
            Err(WorkflowError::InvalidTransition { .. })
        ));
        // State unchanged on rejection.
        assert_eq!(visit.current_stage, before.current_stage);
        assert_eq!(visit.pharmacy_status, before.pharmacy_status);
    }

    #[test]
    fn test_invalid_transition_names_blocking_condition() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);
        apply_action(
            &mut visit,
            VisitAction::OrderLabTest {
                priority: LabPriority::Routine,
            },
            Utc::now(),
        )
        .unwrap();

        // Doctor tries to close the consultation while the lab holds the visit.
        let err = apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: false,
            },
            Utc::now(),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lab result not yet submitted"), "got: {msg}");
    }

    #[test]
    fn test_cancel_from_any_stage() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);

        let applied = apply_action(&mut visit, VisitAction::Cancel, Utc::now()).unwrap();
        assert_eq!(
            applied,
            Applied::Cancelled {
                at_stage: Stage::Doctor
            }
        );
        assert_eq!(visit.overall_status, OverallStatus::Cancelled);
        // Stage left where it was.
        assert_eq!(visit.current_stage, Stage::Doctor);

        // No further transitions accepted, but repeated cancel is quiet.
        assert!(matches!(
            apply_action(&mut visit, VisitAction::RecordVitals, Utc::now()),
            Err(WorkflowError::VisitNotActive { .. })
        ));
        assert_eq!(
            apply_action(&mut visit, VisitAction::Cancel, Utc::now()).unwrap(),
            Applied::AlreadyApplied
        );
    }

    #[test]
    fn test_completed_visit_accepts_nothing() {
        let mut visit = active_visit();
        walk_to_doctor(&mut visit);
        apply_action(
            &mut visit,
            VisitAction::CompleteConsultation {
                needs_pharmacy: false,
            },
            Utc::now(),
        )
        .unwrap();
        apply_action(&mut visit, VisitAction::CompleteBilling, Utc::now()).unwrap();

        assert!(matches!(
            apply_action(&mut visit, VisitAction::Cancel, Utc::now()),
            Err(WorkflowError::VisitNotActive { .. })
        ));
    }

    #[test]
    fn test_action_wire_format() {
        let action: VisitAction =
            serde_json::from_str(r#"{"action":"order_lab_test","priority":"stat"}"#).unwrap();
        assert_eq!(
            action,
            VisitAction::OrderLabTest {
                priority: LabPriority::Stat
            }
        );
    }
}
