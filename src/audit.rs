//! Append-only audit trail.
//!
//! `record` never fails the caller: storage problems are logged at warn and dropped.

use crate::actor::Actor;
use crate::error::{AppError, StorageContext};
use crate::permission::PermissionGate;
use crate::sql::params::{bind_all_as, BindValue};
use crate::sql::QueryBuf;
use crate::state::AppState;
use crate::store::AUDIT_TABLE;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Add,
    Modify,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Add => "Add",
            AuditAction::Modify => "Modify",
            AuditAction::Delete => "Delete",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Add" => Ok(AuditAction::Add),
            "Modify" => Ok(AuditAction::Modify),
            "Delete" => Ok(AuditAction::Delete),
            _ => Err(AppError::Validation(format!("invalid audit action: {}", s))),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: i64,
    pub actor_name: String,
    pub action: AuditAction,
    pub process: String,
    pub detail: String,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    occurred_at: DateTime<Utc>,
    actor_id: i64,
    actor_name: String,
    action: String,
    process: String,
    detail: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AppError;

    fn try_from(r: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            id: r.id,
            occurred_at: r.occurred_at,
            actor_id: r.actor_id,
            actor_name: r.actor_name,
            action: r.action.parse()?,
            process: r.process,
            detail: r.detail,
        })
    }
}

/// Audit search. Dates are UTC days; `date_to` is inclusive.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub actor_id: Option<i64>,
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub detail_contains: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

pub(crate) fn build_query(table: &str, filter: &AuditFilter, limit: u32) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut conds: Vec<String> = Vec::new();
    if let Some(process) = filter.process.as_deref().filter(|p| !p.is_empty()) {
        let ph = q.push_param(BindValue::Text(process.to_string()));
        conds.push(format!("process = {}", ph));
    }
    if let Some(from) = filter.date_from {
        let ph = q.push_param(BindValue::DateTime(from.and_time(chrono::NaiveTime::MIN)));
        conds.push(format!("occurred_at >= ({} AT TIME ZONE 'UTC')", ph));
    }
    if let Some(to) = filter.date_to {
        let next = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::Validation(format!("date_to out of range: {}", to)))?;
        let ph = q.push_param(BindValue::DateTime(next.and_time(chrono::NaiveTime::MIN)));
        conds.push(format!("occurred_at < ({} AT TIME ZONE 'UTC')", ph));
    }
    if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
        if from > to {
            return Err(AppError::Validation("date_from is after date_to".into()));
        }
    }
    if let Some(actor_id) = filter.actor_id {
        let ph = q.push_param(BindValue::Int(actor_id));
        conds.push(format!("actor_id = {}", ph));
    }
    if let Some(action) = filter.action {
        let ph = q.push_param(BindValue::Text(action.as_str().to_string()));
        conds.push(format!("action = {}", ph));
    }
    if let Some(text) = filter.detail_contains.as_deref().filter(|t| !t.is_empty()) {
        let ph = q.push_param(BindValue::Text(text.to_string()));
        conds.push(format!("strpos(lower(detail), lower({})) > 0", ph));
    }
    let where_clause = if conds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conds.join(" AND "))
    };
    q.sql = format!(
        "SELECT id, occurred_at, actor_id, actor_name, action, process, detail FROM {}{} \
         ORDER BY occurred_at DESC, id DESC LIMIT {}",
        table, where_clause, limit
    );
    Ok(q)
}

pub struct AuditRecorder;

impl AuditRecorder {
    /// Append one entry. Failures are logged and swallowed.
    pub async fn record(state: &AppState, actor: &Actor, action: AuditAction, process: &str, detail: &str) {
        let sql = format!(
            "INSERT INTO {} (actor_id, actor_name, action, process, detail) VALUES ($1, $2, $3, $4, $5)",
            state.sys_table(AUDIT_TABLE)
        );
        let res = state
            .bounded("record audit", async {
                sqlx::query(&sql)
                    .bind(actor.id)
                    .bind(&actor.name)
                    .bind(action.as_str())
                    .bind(process)
                    .bind(detail)
                    .execute(&state.pool)
                    .await
                    .storage("record audit")
            })
            .await;
        if let Err(e) = res {
            tracing::warn!(error = %e, actor = actor.id, action = action.as_str(), process, "audit entry dropped");
        }
    }

    /// Entries matching `filter`, newest first. Requires audit access.
    pub async fn query(state: &AppState, actor: &Actor, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AppError> {
        if !PermissionGate::can_view_audit(state, actor).await? {
            return Err(AppError::PermissionDenied("audit log".into()));
        }
        let limit = state.config.effective_list_limit(filter.limit);
        let q = build_query(&state.sys_table(AUDIT_TABLE), filter, limit)?;
        tracing::debug!(sql = %q.sql, params = q.params.len(), "audit query");
        state
            .bounded("query audit", async {
                let rows: Vec<AuditRow> = bind_all_as(sqlx::query_as(&q.sql), &q.params)
                    .fetch_all(&state.pool)
                    .await
                    .storage("query audit")?;
                rows.into_iter().map(AuditEntry::try_from).collect()
            })
            .await
    }
}
