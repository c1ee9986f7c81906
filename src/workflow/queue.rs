//! Queue Projections
//!
//! Read-only "who is waiting" views for each department dashboard. A queue
//! is a filter over visit records plus an ordering rule; it has no side
//! effects and is never the source of truth for whether a transition is
//! legal. Lab entries honor order priority: STAT and Urgent jump ahead of
//! Routine regardless of wait time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::stage::{LabPriority, Stage, StageStatus};
use super::visit::Visit;

/// Summary of one waiting visit, as shown on a department dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub visit_id: Uuid,
    pub patient_id: Uuid,
    pub stage: Stage,
    pub stage_status: StageStatus,
    /// Present only for lab queue entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<LabPriority>,
    /// When the visit last moved; oldest-waiting sorts first.
    pub waiting_since: DateTime<Utc>,
    pub checked_in_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn from_visit(visit: &Visit) -> Self {
        let stage = visit.current_stage;
        Self {
            visit_id: visit.id,
            patient_id: visit.patient_id,
            stage,
            stage_status: visit.status_for(stage),
            priority: if stage == Stage::Lab {
                visit.lab_priority
            } else {
                None
            },
            waiting_since: visit.updated_at,
            checked_in_at: visit.created_at,
        }
    }
}

/// Order a department queue: priority class first (STAT, Urgent, Routine),
/// then oldest-waiting-first. The sort is stable, so entries with equal
/// keys keep their original relative order.
pub fn sort_queue(entries: &mut [QueueEntry]) {
    entries.sort_by_key(|e| (e.priority.unwrap_or(LabPriority::Routine), e.waiting_since));
}

/// Project the queue for one stage out of a set of visit records. The
/// database-backed projector pushes the filter into SQL; this in-memory
/// form backs it and the tests.
pub fn project_queue(
    visits: &[Visit],
    stage: Stage,
    exclude_statuses: &[StageStatus],
) -> Vec<QueueEntry> {
    let mut entries: Vec<QueueEntry> = visits
        .iter()
        .filter(|v| {
            v.current_stage == stage
                && !v.is_terminal()
                && !exclude_statuses.contains(&v.status_for(stage))
        })
        .map(QueueEntry::from_visit)
        .collect();
    sort_queue(&mut entries);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{apply_action, VisitAction};
    use chrono::Duration;

    fn lab_visit(priority: LabPriority, waited: i64) -> Visit {
        let t0 = Utc::now() - Duration::minutes(waited);
        let mut visit = Visit::check_in(Uuid::new_v4(), t0);
        apply_action(&mut visit, VisitAction::CompleteCheckIn, t0).unwrap();
        apply_action(&mut visit, VisitAction::RecordVitals, t0).unwrap();
        apply_action(&mut visit, VisitAction::OrderLabTest { priority }, t0).unwrap();
        visit
    }

    #[test]
    fn test_lab_priority_ordering() {
        // Submitted in order: Routine, STAT, Urgent, Routine (oldest first).
        let visits = vec![
            lab_visit(LabPriority::Routine, 40),
            lab_visit(LabPriority::Stat, 30),
            lab_visit(LabPriority::Urgent, 20),
            lab_visit(LabPriority::Routine, 10),
        ];
        let queue = project_queue(&visits, Stage::Lab, &[]);

        let priorities: Vec<_> = queue.iter().map(|e| e.priority.unwrap()).collect();
        assert_eq!(
            priorities,
            vec![
                LabPriority::Stat,
                LabPriority::Urgent,
                LabPriority::Routine,
                LabPriority::Routine
            ]
        );
        // The two Routine entries keep their original relative order.
        assert_eq!(queue[2].visit_id, visits[0].id);
        assert_eq!(queue[3].visit_id, visits[3].id);
    }

    #[test]
    fn test_oldest_waiting_first_without_priority() {
        let now = Utc::now();
        let older = Visit::check_in(Uuid::new_v4(), now - Duration::minutes(30));
        let newer = Visit::check_in(Uuid::new_v4(), now);
        let queue = project_queue(&[newer.clone(), older.clone()], Stage::Reception, &[]);

        assert_eq!(queue[0].visit_id, older.id);
        assert_eq!(queue[1].visit_id, newer.id);
    }

    #[test]
    fn test_queue_excludes_other_stages_and_terminal_visits() {
        let now = Utc::now();
        let mut at_nurse = Visit::check_in(Uuid::new_v4(), now);
        apply_action(&mut at_nurse, VisitAction::CompleteCheckIn, now).unwrap();

        let mut cancelled = Visit::check_in(Uuid::new_v4(), now);
        apply_action(&mut cancelled, VisitAction::CompleteCheckIn, now).unwrap();
        apply_action(&mut cancelled, VisitAction::Cancel, now).unwrap();

        let at_reception = Visit::check_in(Uuid::new_v4(), now);

        let queue = project_queue(
            &[at_nurse.clone(), cancelled, at_reception],
            Stage::Nurse,
            &[],
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].visit_id, at_nurse.id);
    }

    #[test]
    fn test_exclude_statuses_filter() {
        let now = Utc::now();
        let pending = Visit::check_in(Uuid::new_v4(), now); // reception in_progress
        let queue = project_queue(&[pending], Stage::Reception, &[StageStatus::InProgress]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_non_lab_entries_carry_no_priority() {
        let visit = Visit::check_in(Uuid::new_v4(), Utc::now());
        let entry = QueueEntry::from_visit(&visit);
        assert!(entry.priority.is_none());
    }
}
