use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row, postgres::PgRow};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ReviewRecord, RiskSeverity, RiskSource, RiskVerdict, Summary, Turn};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
}

/// Result of an append under the turn idempotency key. A redelivery of an
/// already-recorded message is a `Duplicate`, never a second row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Recorded,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryInsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Durable record of turns and daily summaries. One implementation is
/// Postgres; tests substitute an in-memory double.
pub trait MemoryStore: Send + Sync {
    fn append_turn<'a>(&'a self, turn: &'a Turn) -> StoreFuture<'a, AppendOutcome>;

    fn turns_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        civil_date: NaiveDate,
    ) -> StoreFuture<'a, Vec<Turn>>;

    fn summary_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        summary_date: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>>;

    fn latest_summary_before<'a>(
        &'a self,
        conversation_id: Uuid,
        before: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>>;

    fn insert_summary<'a>(&'a self, summary: &'a Summary) -> StoreFuture<'a, SummaryInsertOutcome>;
}

/// Append-only sink of escalation records for human review.
pub trait ReviewStore: Send + Sync {
    fn append_review_record<'a>(&'a self, record: &'a ReviewRecord) -> StoreFuture<'a, ()>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

impl MemoryStore for PgStore {
    fn append_turn<'a>(&'a self, turn: &'a Turn) -> StoreFuture<'a, AppendOutcome> {
        Box::pin(async move {
            let verdict = VerdictColumns::from_verdict(&turn.verdict);
            let fired_sources = turn
                .fired_sources
                .iter()
                .map(|source| source.as_str().to_string())
                .collect::<Vec<_>>();

            let result = sqlx::query(
                "INSERT INTO turns (
                    conversation_id,
                    idempotency_key,
                    recorded_at,
                    civil_date,
                    user_text,
                    assistant_text,
                    verdict_kind,
                    verdict_reason,
                    verdict_source,
                    verdict_severity,
                    fired_sources
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (conversation_id, idempotency_key) DO NOTHING",
            )
            .bind(turn.conversation_id)
            .bind(&turn.idempotency_key)
            .bind(turn.recorded_at)
            .bind(turn.civil_date)
            .bind(&turn.user_text)
            .bind(&turn.assistant_text)
            .bind(verdict.kind)
            .bind(verdict.reason)
            .bind(verdict.source)
            .bind(verdict.severity)
            .bind(&fired_sources)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                Ok(AppendOutcome::Duplicate)
            } else {
                Ok(AppendOutcome::Recorded)
            }
        })
    }

    fn turns_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        civil_date: NaiveDate,
    ) -> StoreFuture<'a, Vec<Turn>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT conversation_id, idempotency_key, recorded_at, civil_date,
                        user_text, assistant_text, verdict_kind, verdict_reason,
                        verdict_source, verdict_severity, fired_sources
                 FROM turns
                 WHERE conversation_id = $1 AND civil_date = $2
                 ORDER BY recorded_at, idempotency_key",
            )
            .bind(conversation_id)
            .bind(civil_date)
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(turn_from_row).collect()
        })
    }

    fn summary_for_day<'a>(
        &'a self,
        conversation_id: Uuid,
        summary_date: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT conversation_id, summary_date, main_concerns, emotional_patterns,
                        coping_strategies, progress_notes, important_context,
                        source_turn_count, created_at
                 FROM summaries
                 WHERE conversation_id = $1 AND summary_date = $2",
            )
            .bind(conversation_id)
            .bind(summary_date)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(summary_from_row).transpose()
        })
    }

    fn latest_summary_before<'a>(
        &'a self,
        conversation_id: Uuid,
        before: NaiveDate,
    ) -> StoreFuture<'a, Option<Summary>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT conversation_id, summary_date, main_concerns, emotional_patterns,
                        coping_strategies, progress_notes, important_context,
                        source_turn_count, created_at
                 FROM summaries
                 WHERE conversation_id = $1 AND summary_date < $2
                 ORDER BY summary_date DESC
                 LIMIT 1",
            )
            .bind(conversation_id)
            .bind(before)
            .fetch_optional(&self.pool)
            .await?;

            row.as_ref().map(summary_from_row).transpose()
        })
    }

    fn insert_summary<'a>(&'a self, summary: &'a Summary) -> StoreFuture<'a, SummaryInsertOutcome> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO summaries (
                    conversation_id,
                    summary_date,
                    main_concerns,
                    emotional_patterns,
                    coping_strategies,
                    progress_notes,
                    important_context,
                    source_turn_count,
                    created_at
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (conversation_id, summary_date) DO NOTHING",
            )
            .bind(summary.conversation_id)
            .bind(summary.summary_date)
            .bind(&summary.main_concerns)
            .bind(&summary.emotional_patterns)
            .bind(&summary.coping_strategies)
            .bind(&summary.progress_notes)
            .bind(&summary.important_context)
            .bind(summary.source_turn_count as i32)
            .bind(summary.created_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                Ok(SummaryInsertOutcome::AlreadyExists)
            } else {
                Ok(SummaryInsertOutcome::Inserted)
            }
        })
    }
}

impl ReviewStore for PgStore {
    fn append_review_record<'a>(&'a self, record: &'a ReviewRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO review_records (
                    conversation_id, direction, source, reason, severity, excerpt, observed_at
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(record.conversation_id)
            .bind(record.direction.as_str())
            .bind(record.source.as_str())
            .bind(&record.reason)
            .bind(record.severity.map(RiskSeverity::as_str))
            .bind(&record.excerpt)
            .bind(record.observed_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }
}

struct VerdictColumns {
    kind: &'static str,
    reason: Option<String>,
    source: Option<&'static str>,
    severity: Option<&'static str>,
}

impl VerdictColumns {
    fn from_verdict(verdict: &RiskVerdict) -> Self {
        match verdict {
            RiskVerdict::Clear => Self {
                kind: "clear",
                reason: None,
                source: None,
                severity: None,
            },
            RiskVerdict::Flagged {
                reason,
                severity,
                source,
            } => Self {
                kind: "flagged",
                reason: Some(reason.clone()),
                source: Some(source.as_str()),
                severity: Some(severity.as_str()),
            },
            RiskVerdict::Blocked { reason, source } => Self {
                kind: "blocked",
                reason: Some(reason.clone()),
                source: Some(source.as_str()),
                severity: None,
            },
        }
    }
}

fn verdict_from_columns(
    kind: &str,
    reason: Option<String>,
    source: Option<String>,
    severity: Option<String>,
) -> Result<RiskVerdict, StoreError> {
    match kind {
        "clear" => Ok(RiskVerdict::Clear),
        "flagged" => {
            let reason =
                reason.ok_or_else(|| StoreError::InvalidData("flagged verdict without reason".to_string()))?;
            let source = parse_source(source)?;
            let severity = severity
                .as_deref()
                .and_then(RiskSeverity::from_db)
                .ok_or_else(|| {
                    StoreError::InvalidData("flagged verdict with invalid severity".to_string())
                })?;
            Ok(RiskVerdict::Flagged {
                reason,
                severity,
                source,
            })
        }
        "blocked" => {
            let reason =
                reason.ok_or_else(|| StoreError::InvalidData("blocked verdict without reason".to_string()))?;
            let source = parse_source(source)?;
            Ok(RiskVerdict::Blocked { reason, source })
        }
        other => Err(StoreError::InvalidData(format!(
            "unknown verdict kind persisted: {other}"
        ))),
    }
}

fn parse_source(source: Option<String>) -> Result<RiskSource, StoreError> {
    source
        .as_deref()
        .and_then(RiskSource::from_db)
        .ok_or_else(|| StoreError::InvalidData("verdict with invalid source".to_string()))
}

fn turn_from_row(row: &PgRow) -> Result<Turn, StoreError> {
    let verdict = verdict_from_columns(
        row.try_get::<String, _>("verdict_kind")?.as_str(),
        row.try_get("verdict_reason")?,
        row.try_get("verdict_source")?,
        row.try_get("verdict_severity")?,
    )?;

    let fired_sources = row
        .try_get::<Vec<String>, _>("fired_sources")?
        .iter()
        .map(|value| {
            RiskSource::from_db(value).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown risk source persisted: {value}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Turn {
        conversation_id: row.try_get("conversation_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        recorded_at: row.try_get("recorded_at")?,
        civil_date: row.try_get("civil_date")?,
        user_text: row.try_get("user_text")?,
        assistant_text: row.try_get("assistant_text")?,
        verdict,
        fired_sources,
    })
}

fn summary_from_row(row: &PgRow) -> Result<Summary, StoreError> {
    let source_turn_count: i32 = row.try_get("source_turn_count")?;
    let source_turn_count = u32::try_from(source_turn_count).map_err(|_| {
        StoreError::InvalidData("negative source_turn_count persisted".to_string())
    })?;

    Ok(Summary {
        conversation_id: row.try_get("conversation_id")?,
        summary_date: row.try_get("summary_date")?,
        main_concerns: row.try_get("main_concerns")?,
        emotional_patterns: row.try_get("emotional_patterns")?,
        coping_strategies: row.try_get("coping_strategies")?,
        progress_notes: row.try_get("progress_notes")?,
        important_context: row.try_get("important_context")?,
        source_turn_count,
        created_at: row.try_get("created_at")?,
    })
}
