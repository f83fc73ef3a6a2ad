//! Action ledger persistence.
//!
//! Status changes go through [`StockDb::action_transition`], a
//! compare-and-swap on the current status. The `EXECUTED` transition writes
//! its audit row inside the same transaction.

use crate::error::{DbError, Result};
use crate::ids::{ActionId, CompanyId, ConversationId, UserId};
use crate::types::*;
use crate::{opt_millis_to_datetime, StockDb};
use sqlx::Row;
use tracing::{debug, warn};

/// A requested status change: `from` must be the stored status for the
/// update to apply.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: ActionStatus,
    pub to: ActionStatus,
    /// Who confirmed or cancelled. Ignored for execution outcomes.
    pub actor: Option<UserId>,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
}

impl Transition {
    pub fn confirm(actor: Option<UserId>) -> Self {
        Self {
            from: ActionStatus::Proposed,
            to: ActionStatus::Confirmed,
            actor,
            result_json: None,
            error_message: None,
        }
    }

    pub fn cancel(actor: Option<UserId>) -> Self {
        Self {
            from: ActionStatus::Proposed,
            to: ActionStatus::Cancelled,
            actor,
            result_json: None,
            error_message: None,
        }
    }

    pub fn executed(result_json: impl Into<String>) -> Self {
        Self {
            from: ActionStatus::Confirmed,
            to: ActionStatus::Executed,
            actor: None,
            result_json: Some(result_json.into()),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            from: ActionStatus::Confirmed,
            to: ActionStatus::Failed,
            actor: None,
            result_json: None,
            error_message: Some(error_message.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.from.can_transition_to(self.to) {
            return Err(DbError::constraint(format!(
                "illegal ledger edge {} -> {}",
                self.from, self.to
            )));
        }
        match self.to {
            ActionStatus::Executed if self.result_json.is_none() => Err(DbError::constraint(
                "EXECUTED transition requires a result",
            )),
            ActionStatus::Failed if self.error_message.is_none() => Err(DbError::constraint(
                "FAILED transition requires an error message",
            )),
            _ => Ok(()),
        }
    }
}

impl StockDb {
    // ========================================================================
    // Ledger rows
    // ========================================================================

    /// Insert a new ledger row. Callers build it with [`ProposedAction::new`].
    pub async fn action_insert(&self, action: &ProposedAction) -> Result<()> {
        if action.status != ActionStatus::Proposed {
            return Err(DbError::constraint(format!(
                "new actions must be PROPOSED, got {}",
                action.status
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO actions (
                id, company_id, conversation_id, action_type, arguments_json,
                status, proposed_by, created_at
            )
            VALUES (?, ?, ?, ?, ?, 'PROPOSED', ?, ?)
            "#,
        )
        .bind(action.id.as_str())
        .bind(action.company_id.as_str())
        .bind(action.conversation_id.as_ref().map(|c| c.as_str()))
        .bind(&action.action_type)
        .bind(&action.arguments_json)
        .bind(action.proposed_by.as_ref().map(|u| u.as_str()))
        .bind(action.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(action_id = %action.id, action_type = %action.action_type, "Action proposed");
        Ok(())
    }

    /// Load one action scoped to a company. Rows owned by another company
    /// read as absent.
    pub async fn action_get(
        &self,
        company_id: &CompanyId,
        id: &ActionId,
    ) -> Result<Option<ProposedAction>> {
        let row = sqlx::query("SELECT * FROM actions WHERE id = ? AND company_id = ?")
            .bind(id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_action(&row)).transpose()
    }

    /// List actions for a company, newest first.
    pub async fn action_list(
        &self,
        company_id: &CompanyId,
        filter: &ActionFilter,
    ) -> Result<Vec<ProposedAction>> {
        let mut sql = String::from("SELECT * FROM actions WHERE company_id = ?");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.conversation_id.is_some() {
            sql.push_str(" AND conversation_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query = sqlx::query(&sql).bind(company_id.as_str());
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(ref conversation_id) = filter.conversation_id {
            query = query.bind(conversation_id.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_action).collect()
    }

    /// Apply a status change if the stored status still equals
    /// `transition.from`.
    ///
    /// Returns `false` when another writer got there first (or the row does
    /// not exist for this company). On `EXECUTED` the audit row is inserted
    /// in the same transaction.
    pub async fn action_transition(
        &self,
        company_id: &CompanyId,
        id: &ActionId,
        transition: &Transition,
    ) -> Result<bool> {
        transition.validate()?;
        let now = Self::now_millis();
        let actor = transition.actor.as_ref().map(|u| u.as_str());

        let mut tx = self.pool.begin().await?;

        let result = match transition.to {
            ActionStatus::Confirmed => {
                sqlx::query(
                    r#"
                    UPDATE actions SET status = 'CONFIRMED', confirmed_at = ?, decided_by = ?
                    WHERE id = ? AND company_id = ? AND status = ?
                    "#,
                )
                .bind(now)
                .bind(actor)
                .bind(id.as_str())
                .bind(company_id.as_str())
                .bind(transition.from.as_str())
                .execute(&mut *tx)
                .await?
            }
            ActionStatus::Cancelled => {
                sqlx::query(
                    r#"
                    UPDATE actions SET status = 'CANCELLED', cancelled_at = ?, decided_by = ?
                    WHERE id = ? AND company_id = ? AND status = ?
                    "#,
                )
                .bind(now)
                .bind(actor)
                .bind(id.as_str())
                .bind(company_id.as_str())
                .bind(transition.from.as_str())
                .execute(&mut *tx)
                .await?
            }
            ActionStatus::Executed => {
                sqlx::query(
                    r#"
                    UPDATE actions SET status = 'EXECUTED', executed_at = ?, result_json = ?
                    WHERE id = ? AND company_id = ? AND status = ?
                    "#,
                )
                .bind(now)
                .bind(transition.result_json.as_deref())
                .bind(id.as_str())
                .bind(company_id.as_str())
                .bind(transition.from.as_str())
                .execute(&mut *tx)
                .await?
            }
            ActionStatus::Failed => {
                sqlx::query(
                    r#"
                    UPDATE actions SET status = 'FAILED', error_message = ?
                    WHERE id = ? AND company_id = ? AND status = ?
                    "#,
                )
                .bind(transition.error_message.as_deref())
                .bind(id.as_str())
                .bind(company_id.as_str())
                .bind(transition.from.as_str())
                .execute(&mut *tx)
                .await?
            }
            ActionStatus::Proposed => {
                return Err(DbError::constraint("no transition leads back to PROPOSED"))
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(action_id = %id, from = %transition.from, to = %transition.to, "CAS lost");
            return Ok(false);
        }

        if transition.to == ActionStatus::Executed {
            sqlx::query(
                r#"
                INSERT INTO audit_log (
                    action_id, company_id, action_type, actor, proposed_args, result, recorded_at
                )
                SELECT id, company_id, action_type, decided_by, arguments_json, result_json, ?
                FROM actions WHERE id = ?
                "#,
            )
            .bind(now)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(action_id = %id, from = %transition.from, to = %transition.to, "Action transitioned");
        Ok(true)
    }

    /// Count actions per status for a company.
    pub async fn action_status_counts(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<(ActionStatus, u64)>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM actions WHERE company_id = ? GROUP BY status ORDER BY status",
        )
        .bind(company_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("status");
            match ActionStatus::parse(&raw) {
                Some(status) => counts.push((status, row.get::<i64, _>("n") as u64)),
                None => warn!(status = %raw, "Skipping unknown action status"),
            }
        }
        Ok(counts)
    }

    // ========================================================================
    // Audit log
    // ========================================================================

    /// Audit rows for a company, newest first.
    pub async fn audit_list(
        &self,
        company_id: &CompanyId,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>> {
        let mut sql = String::from(
            "SELECT * FROM audit_log WHERE company_id = ? ORDER BY recorded_at DESC, action_id",
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = sqlx::query(&sql)
            .bind(company_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_audit).collect())
    }

    /// Audit row for one action, if it was executed.
    pub async fn audit_get(
        &self,
        company_id: &CompanyId,
        action_id: &ActionId,
    ) -> Result<Option<AuditEntry>> {
        let row = sqlx::query("SELECT * FROM audit_log WHERE action_id = ? AND company_id = ?")
            .bind(action_id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_audit))
    }
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<ProposedAction> {
    let status_str: String = row.get("status");
    let status = ActionStatus::parse(&status_str)
        .ok_or_else(|| DbError::corrupt(format!("Unknown action status: {}", status_str)))?;

    Ok(ProposedAction {
        id: ActionId::from_string(row.get::<String, _>("id")),
        company_id: CompanyId::from_string(row.get::<String, _>("company_id")),
        conversation_id: row
            .get::<Option<String>, _>("conversation_id")
            .map(ConversationId::from_string),
        action_type: row.get("action_type"),
        arguments_json: row.get("arguments_json"),
        status,
        proposed_by: row.get::<Option<String>, _>("proposed_by").map(UserId::from_string),
        decided_by: row.get::<Option<String>, _>("decided_by").map(UserId::from_string),
        created_at: StockDb::millis_to_datetime(row.get("created_at")),
        confirmed_at: opt_millis_to_datetime(row.get("confirmed_at")),
        executed_at: opt_millis_to_datetime(row.get("executed_at")),
        cancelled_at: opt_millis_to_datetime(row.get("cancelled_at")),
        result_json: row.get("result_json"),
        error_message: row.get("error_message"),
    })
}

fn row_to_audit(row: &sqlx::sqlite::SqliteRow) -> AuditEntry {
    AuditEntry {
        action_id: ActionId::from_string(row.get::<String, _>("action_id")),
        company_id: CompanyId::from_string(row.get::<String, _>("company_id")),
        action_type: row.get("action_type"),
        actor: row.get::<Option<String>, _>("actor").map(UserId::from_string),
        proposed_args: row.get("proposed_args"),
        result: row.get("result"),
        recorded_at: StockDb::millis_to_datetime(row.get("recorded_at")),
    }
}
