//! Visit Persistence
//!
//! Database persistence for visit records and the transactional transition
//! engine. Every read-then-write path locks the visit row (`FOR UPDATE`)
//! and carries an optimistic version check, so two departments racing to
//! advance the same visit serialize instead of clobbering each other.
//!
//! NOTE: All queries use runtime-checked sqlx::query() instead of
//! compile-time sqlx::query!() macros because the tables are created by
//! migrations that may not exist at compile time.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::engine::{apply_action, Applied, VisitAction};
use super::queue::{sort_queue, QueueEntry};
use super::stage::{LabPriority, OverallStatus, Stage, StageStatus};
use super::visit::Visit;
use crate::billing::InvoiceStatus;
use crate::error::WorkflowError;

const SELECT_VISIT: &str = r#"
    SELECT id, patient_id, current_stage, overall_status,
           reception_status, nurse_status, doctor_status,
           lab_status, pharmacy_status, billing_status,
           lab_priority,
           reception_completed_at, nurse_completed_at, doctor_completed_at,
           lab_completed_at, pharmacy_completed_at, billing_completed_at,
           created_at, updated_at, version
    FROM visits
"#;

/// Repository for visit record persistence.
pub struct VisitRepository {
    pool: PgPool,
}

impl VisitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a freshly checked-in visit.
    pub async fn insert(&self, visit: &Visit) -> Result<(), WorkflowError> {
        sqlx::query(
            r#"
            INSERT INTO visits
            (id, patient_id, current_stage, overall_status,
             reception_status, nurse_status, doctor_status,
             lab_status, pharmacy_status, billing_status,
             lab_priority,
             created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(visit.id)
        .bind(visit.patient_id)
        .bind(visit.current_stage.as_str())
        .bind(visit.overall_status.as_str())
        .bind(visit.reception_status.as_str())
        .bind(visit.nurse_status.as_str())
        .bind(visit.doctor_status.as_str())
        .bind(visit.lab_status.as_str())
        .bind(visit.pharmacy_status.as_str())
        .bind(visit.billing_status.as_str())
        .bind(visit.lab_priority.map(|p| p.as_str()))
        .bind(visit.created_at)
        .bind(visit.updated_at)
        .bind(visit.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load a visit by ID.
    pub async fn load(&self, visit_id: Uuid) -> Result<Visit, WorkflowError> {
        let row = sqlx::query_as::<_, VisitRow>(&format!("{SELECT_VISIT} WHERE id = $1"))
            .bind(visit_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(WorkflowError::VisitNotFound(visit_id))?;

        row.try_into()
    }

    /// Find a patient's active visit, if any. At most one exists.
    pub async fn find_active_by_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<Visit>, WorkflowError> {
        let row = sqlx::query_as::<_, VisitRow>(&format!(
            "{SELECT_VISIT} WHERE patient_id = $1 AND overall_status = 'active'"
        ))
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Lock and load a visit inside an open transaction.
    pub(crate) async fn load_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        visit_id: Uuid,
    ) -> Result<Visit, WorkflowError> {
        let row =
            sqlx::query_as::<_, VisitRow>(&format!("{SELECT_VISIT} WHERE id = $1 FOR UPDATE"))
                .bind(visit_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(WorkflowError::VisitNotFound(visit_id))?;

        row.try_into()
    }

    /// Write the post-transition visit state. The version predicate is a
    /// belt-and-braces check on top of the row lock.
    pub(crate) async fn update_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        visit: &Visit,
        expected_version: i64,
    ) -> Result<(), WorkflowError> {
        let result = sqlx::query(
            r#"
            UPDATE visits SET
                current_stage = $2, overall_status = $3,
                reception_status = $4, nurse_status = $5, doctor_status = $6,
                lab_status = $7, pharmacy_status = $8, billing_status = $9,
                lab_priority = $10,
                reception_completed_at = $11, nurse_completed_at = $12,
                doctor_completed_at = $13, lab_completed_at = $14,
                pharmacy_completed_at = $15, billing_completed_at = $16,
                updated_at = $17, version = $18
            WHERE id = $1 AND version = $19
            "#,
        )
        .bind(visit.id)
        .bind(visit.current_stage.as_str())
        .bind(visit.overall_status.as_str())
        .bind(visit.reception_status.as_str())
        .bind(visit.nurse_status.as_str())
        .bind(visit.doctor_status.as_str())
        .bind(visit.lab_status.as_str())
        .bind(visit.pharmacy_status.as_str())
        .bind(visit.billing_status.as_str())
        .bind(visit.lab_priority.map(|p| p.as_str()))
        .bind(visit.reception_completed_at)
        .bind(visit.nurse_completed_at)
        .bind(visit.doctor_completed_at)
        .bind(visit.lab_completed_at)
        .bind(visit.pharmacy_completed_at)
        .bind(visit.billing_completed_at)
        .bind(visit.updated_at)
        .bind(visit.version)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::ConcurrentModification(visit.id));
        }
        Ok(())
    }

    /// Append a transition to the audit log.
    pub(crate) async fn log_transition(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        visit_id: Uuid,
        action: &str,
        from_stage: &str,
        to_stage: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        sqlx::query(
            r#"
            INSERT INTO visit_transitions
            (visit_id, action, from_stage, to_stage, transitioned_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(visit_id)
        .bind(action)
        .bind(from_stage)
        .bind(to_stage)
        .bind(at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// Transactional wrapper around the pure state machine: one call, one
/// transaction, both stage writes or neither.
pub struct TransitionEngine {
    repo: VisitRepository,
    pool: PgPool,
}

impl TransitionEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: VisitRepository::new(pool.clone()),
            pool,
        }
    }

    /// Check a patient in, creating a visit at reception. Rejects a second
    /// active visit for the same patient.
    pub async fn check_in(&self, patient_id: Uuid) -> Result<Visit, WorkflowError> {
        if self
            .repo
            .find_active_by_patient(patient_id)
            .await?
            .is_some()
        {
            return Err(WorkflowError::ActiveVisitExists(patient_id));
        }

        let visit = Visit::check_in(patient_id, Utc::now());
        self.repo.insert(&visit).await?;
        info!(visit_id = %visit.id, patient_id = %patient_id, "patient checked in");
        Ok(visit)
    }

    /// Validate and apply a department action. The row lock is held from
    /// read to commit, so racing departments serialize here.
    pub async fn apply(
        &self,
        visit_id: Uuid,
        action: VisitAction,
    ) -> Result<(Visit, Applied), WorkflowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut visit = self.repo.load_for_update(&mut tx, visit_id).await?;
        let expected_version = visit.version;

        // Completing billing through the action endpoint requires the
        // linked invoice, if any, to be fully paid. The payment applier
        // is the normal trigger and has already settled the invoice in
        // its own transaction when it fires this transition.
        if action == VisitAction::CompleteBilling && visit.current_stage == Stage::Billing {
            if let Some(status) = self.invoice_status_for_visit(&mut tx, visit_id).await? {
                if status.blocks_billing_completion() {
                    return Err(WorkflowError::InvalidTransition {
                        from: format!(
                            "{} ({})",
                            visit.current_stage,
                            visit.status_for(visit.current_stage)
                        ),
                        to: format!("{} via {}", Stage::Completed, action.as_str()),
                        blocked_on: "invoice not fully paid".to_string(),
                    });
                }
            }
        }

        let applied = apply_action(&mut visit, action, now)?;

        if matches!(applied, Applied::AlreadyApplied) {
            // Idempotent retry: nothing to write.
            tx.commit().await?;
            return Ok((visit, applied));
        }

        visit.version += 1;
        self.repo
            .update_in_tx(&mut tx, &visit, expected_version)
            .await?;

        if let Applied::Advanced { from, to } = &applied {
            self.repo
                .log_transition(
                    &mut tx,
                    visit.id,
                    action.as_str(),
                    from.as_str(),
                    to.as_str(),
                    now,
                )
                .await?;
        }

        tx.commit().await?;
        info!(
            visit_id = %visit.id,
            action = action.as_str(),
            stage = %visit.current_stage,
            "visit transitioned"
        );
        Ok((visit, applied))
    }

    /// Status of the invoice linked to a visit, if one exists, read under
    /// the transaction's lock.
    async fn invoice_status_for_visit(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        visit_id: Uuid,
    ) -> Result<Option<InvoiceStatus>, WorkflowError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM invoices WHERE visit_id = $1 FOR UPDATE")
                .bind(visit_id)
                .fetch_optional(&mut **tx)
                .await?;

        row.map(|(raw,)| {
            InvoiceStatus::parse(&raw).map_err(|_| WorkflowError::InvalidStatus(raw))
        })
        .transpose()
    }

    pub fn repository(&self) -> &VisitRepository {
        &self.repo
    }
}

/// Read-only queue projections. No locking; slightly stale results are
/// acceptable for "who's waiting" views, never for transition decisions.
pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List the visits a department should act on next, oldest first, with
    /// STAT/Urgent lab orders ahead of Routine.
    pub async fn list_queue(
        &self,
        stage: Stage,
        exclude_statuses: &[StageStatus],
    ) -> Result<Vec<QueueEntry>, WorkflowError> {
        let status_column = match stage {
            Stage::Reception => "reception_status",
            Stage::Nurse => "nurse_status",
            Stage::Doctor => "doctor_status",
            Stage::Lab => "lab_status",
            Stage::Pharmacy => "pharmacy_status",
            Stage::Billing => "billing_status",
            Stage::Completed => "billing_status",
        };
        let excluded: Vec<String> = exclude_statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, VisitRow>(&format!(
            r#"{SELECT_VISIT}
            WHERE current_stage = $1
              AND overall_status = 'active'
              AND NOT ({status_column} = ANY($2))
            ORDER BY updated_at ASC
            "#
        ))
        .bind(stage.as_str())
        .bind(&excluded)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(|row| Visit::try_from(row).map(|v| QueueEntry::from_visit(&v)))
            .collect::<Result<Vec<_>, _>>()?;

        // Priority re-sort in memory; SQL gives the stable time order.
        sort_queue(&mut entries);
        Ok(entries)
    }
}

/// Database row for a visit. Stage/status land as text and are decoded
/// through the closed enums; an unrecognized value is an error, not a
/// default.
#[derive(Debug, sqlx::FromRow)]
struct VisitRow {
    id: Uuid,
    patient_id: Uuid,
    current_stage: String,
    overall_status: String,
    reception_status: String,
    nurse_status: String,
    doctor_status: String,
    lab_status: String,
    pharmacy_status: String,
    billing_status: String,
    lab_priority: Option<String>,
    reception_completed_at: Option<DateTime<Utc>>,
    nurse_completed_at: Option<DateTime<Utc>>,
    doctor_completed_at: Option<DateTime<Utc>>,
    lab_completed_at: Option<DateTime<Utc>>,
    pharmacy_completed_at: Option<DateTime<Utc>>,
    billing_completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<VisitRow> for Visit {
    type Error = WorkflowError;

    fn try_from(row: VisitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            patient_id: row.patient_id,
            current_stage: Stage::parse(&row.current_stage)?,
            overall_status: OverallStatus::parse(&row.overall_status)?,
            reception_status: StageStatus::parse(&row.reception_status)?,
            nurse_status: StageStatus::parse(&row.nurse_status)?,
            doctor_status: StageStatus::parse(&row.doctor_status)?,
            lab_status: StageStatus::parse(&row.lab_status)?,
            pharmacy_status: StageStatus::parse(&row.pharmacy_status)?,
            billing_status: StageStatus::parse(&row.billing_status)?,
            lab_priority: row.lab_priority.as_deref().map(LabPriority::parse).transpose()?,
            reception_completed_at: row.reception_completed_at,
            nurse_completed_at: row.nurse_completed_at,
            doctor_completed_at: row.doctor_completed_at,
            lab_completed_at: row.lab_completed_at,
            pharmacy_completed_at: row.pharmacy_completed_at,
            billing_completed_at: row.billing_completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}
