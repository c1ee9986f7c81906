//! End-to-end visit lifecycle tests over the pure state machine.

use chrono::{Duration, Utc};
use uuid::Uuid;
use visitflow::{
    apply_action, Applied, LabPriority, OverallStatus, Stage, StageStatus, Visit, VisitAction,
    WorkflowError,
};

fn check_in() -> Visit {
    Visit::check_in(Uuid::new_v4(), Utc::now())
}

/// Walk a visit through every department including the lab detour, and
/// assert the record looks right at each handoff.
#[test]
fn full_visit_with_lab_and_pharmacy() {
    let mut visit = check_in();
    let t = Utc::now();

    apply_action(&mut visit, VisitAction::CompleteCheckIn, t).unwrap();
    assert_eq!(visit.current_stage, Stage::Nurse);
    assert_eq!(visit.nurse_status, StageStatus::Pending);

    apply_action(&mut visit, VisitAction::RecordVitals, t + Duration::minutes(5)).unwrap();
    assert_eq!(visit.current_stage, Stage::Doctor);

    apply_action(
        &mut visit,
        VisitAction::OrderLabTest {
            priority: LabPriority::Urgent,
        },
        t + Duration::minutes(10),
    )
    .unwrap();
    assert_eq!(visit.current_stage, Stage::Lab);
    // Consultation stays open while the lab works.
    assert_eq!(visit.doctor_status, StageStatus::InProgress);
    assert!(visit.doctor_completed_at.is_none());

    apply_action(
        &mut visit,
        VisitAction::SubmitLabResult,
        t + Duration::minutes(40),
    )
    .unwrap();
    assert_eq!(visit.current_stage, Stage::Doctor);
    assert_eq!(visit.doctor_status, StageStatus::Pending);
    assert_eq!(visit.lab_status, StageStatus::Completed);

    apply_action(
        &mut visit,
        VisitAction::CompleteConsultation {
            needs_pharmacy: true,
        },
        t + Duration::minutes(50),
    )
    .unwrap();
    assert_eq!(visit.current_stage, Stage::Pharmacy);

    apply_action(
        &mut visit,
        VisitAction::CompleteDispensing,
        t + Duration::minutes(60),
    )
    .unwrap();
    assert_eq!(visit.current_stage, Stage::Billing);

    apply_action(
        &mut visit,
        VisitAction::CompleteBilling,
        t + Duration::minutes(70),
    )
    .unwrap();
    assert_eq!(visit.current_stage, Stage::Completed);
    assert_eq!(visit.overall_status, OverallStatus::Completed);

    // Every visited stage carries its completion timestamp.
    assert!(visit.reception_completed_at.is_some());
    assert!(visit.nurse_completed_at.is_some());
    assert!(visit.doctor_completed_at.is_some());
    assert!(visit.lab_completed_at.is_some());
    assert!(visit.pharmacy_completed_at.is_some());
    assert!(visit.billing_completed_at.is_some());
}

/// A visit at doctor with a completed consultation gets a
/// lab order; after the result it must be back at doctor, not pharmacy.
#[test]
fn loop_back_lands_at_doctor_not_pharmacy() {
    let mut visit = check_in();
    apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
    apply_action(&mut visit, VisitAction::RecordVitals, Utc::now()).unwrap();

    apply_action(
        &mut visit,
        VisitAction::OrderLabTest {
            priority: LabPriority::Routine,
        },
        Utc::now(),
    )
    .unwrap();
    apply_action(&mut visit, VisitAction::SubmitLabResult, Utc::now()).unwrap();

    assert_eq!(visit.current_stage, Stage::Doctor);
    assert_eq!(visit.doctor_status, StageStatus::Pending);
    assert_ne!(visit.current_stage, Stage::Pharmacy);
}

/// A pharmacy completion posted against a visit still at
/// reception is rejected and changes nothing.
#[test]
fn premature_department_action_rejected() {
    let mut visit = check_in();
    let before = serde_json::to_value(&visit).unwrap();

    let err = apply_action(&mut visit, VisitAction::CompleteDispensing, Utc::now()).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    let after = serde_json::to_value(&visit).unwrap();
    assert_eq!(before, after);
}

/// Invoking the same completion action twice on an
/// already-advanced visit does not change state and does not error.
#[test]
fn retried_actions_are_noops_along_the_whole_path() {
    let mut visit = check_in();
    let actions = [
        VisitAction::CompleteCheckIn,
        VisitAction::RecordVitals,
        VisitAction::CompleteConsultation {
            needs_pharmacy: true,
        },
        VisitAction::CompleteDispensing,
    ];

    for action in actions {
        apply_action(&mut visit, action, Utc::now()).unwrap();
        let snapshot = serde_json::to_value(&visit).unwrap();

        let retried = apply_action(&mut visit, action, Utc::now()).unwrap();
        assert_eq!(retried, Applied::AlreadyApplied, "retry of {action:?}");
        assert_eq!(snapshot, serde_json::to_value(&visit).unwrap());
    }
}

/// Cancellation freezes the visit wherever it is.
#[test]
fn cancelled_visit_is_terminal_in_place() {
    let mut visit = check_in();
    apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
    apply_action(&mut visit, VisitAction::Cancel, Utc::now()).unwrap();

    assert_eq!(visit.overall_status, OverallStatus::Cancelled);
    assert_eq!(visit.current_stage, Stage::Nurse);

    for action in [
        VisitAction::RecordVitals,
        VisitAction::CompleteBilling,
        VisitAction::OrderLabTest {
            priority: LabPriority::Stat,
        },
    ] {
        assert!(matches!(
            apply_action(&mut visit, action, Utc::now()),
            Err(WorkflowError::VisitNotActive { .. })
        ));
    }
}

/// A visit that skips pharmacy never passes through it.
#[test]
fn pharmacy_not_required_path() {
    let mut visit = check_in();
    apply_action(&mut visit, VisitAction::CompleteCheckIn, Utc::now()).unwrap();
    apply_action(&mut visit, VisitAction::RecordVitals, Utc::now()).unwrap();
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
    assert!(visit.pharmacy_completed_at.is_none());

    apply_action(&mut visit, VisitAction::CompleteBilling, Utc::now()).unwrap();
    assert_eq!(visit.overall_status, OverallStatus::Completed);
}

/// While the visit is active, the current stage's own
/// status is never `completed`.
#[test]
fn active_visit_never_sits_on_a_completed_stage() {
    let mut visit = check_in();
    let actions = [
        VisitAction::CompleteCheckIn,
        VisitAction::RecordVitals,
        VisitAction::OrderLabTest {
            priority: LabPriority::Stat,
        },
        VisitAction::SubmitLabResult,
        VisitAction::OrderLabTest {
            priority: LabPriority::Routine,
        },
        VisitAction::SubmitLabResult,
        VisitAction::CompleteConsultation {
            needs_pharmacy: true,
        },
        VisitAction::CompleteDispensing,
        VisitAction::CompleteBilling,
    ];

    for action in actions {
        apply_action(&mut visit, action, Utc::now()).unwrap();
        if visit.overall_status == OverallStatus::Active {
            assert_ne!(visit.status_for(visit.current_stage), StageStatus::Completed);
        }
    }
    assert_eq!(visit.overall_status, OverallStatus::Completed);
}
