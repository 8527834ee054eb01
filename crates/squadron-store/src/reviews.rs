use crate::gateway::{parse_enum, parse_ts, StoreGateway};
use rusqlite::{params, Row};
use squadron_core::{SquadronResult, Verdict};

const REVIEW_COLUMNS: &str = "id, task_id, result_id, decision, reasons, checks, created_at, seq";

fn verdict_from_row(row: &Row<'_>) -> rusqlite::Result<Verdict> {
    let reasons_json: String = row.get(4)?;
    let checks_json: String = row.get(5)?;
    let json_err = |e: serde_json::Error| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    };
    Ok(Verdict {
        id: row.get(0)?,
        task_id: row.get(1)?,
        result_id: row.get(2)?,
        decision: parse_enum(3, row.get::<_, String>(3)?)?,
        reasons: serde_json::from_str(&reasons_json).map_err(json_err)?,
        checks: serde_json::from_str(&checks_json).map_err(json_err)?,
        created_at: parse_ts(6, row.get::<_, String>(6)?)?,
        seq: row.get(7)?,
    })
}

impl StoreGateway {
    /// Appends a verdict row; prior verdicts are never mutated. Returns the
    /// store-assigned sequence number.
    pub fn insert_verdict(&self, verdict: &Verdict) -> SquadronResult<i64> {
        let reasons = serde_json::to_string(&verdict.reasons)?;
        let checks = serde_json::to_string(&verdict.checks)?;
        self.execute(
            "INSERT INTO auto_reviews (id, task_id, result_id, decision, reasons, checks, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                verdict.id,
                verdict.task_id,
                verdict.result_id,
                verdict.decision.as_str(),
                reasons,
                checks,
                verdict.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.last_insert_rowid())
    }

    /// The most recent verdict for a task, `seq` breaking timestamp ties.
    pub fn latest_verdict(&self, task_id: &str) -> SquadronResult<Option<Verdict>> {
        self.query_one(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM auto_reviews WHERE task_id = ?1 \
                 ORDER BY created_at DESC, seq DESC LIMIT 1"
            ),
            params![task_id],
            verdict_from_row,
        )
    }

    /// Every verdict recorded for a task, oldest first.
    pub fn verdicts_for(&self, task_id: &str) -> SquadronResult<Vec<Verdict>> {
        self.query(
            &format!(
                "SELECT {REVIEW_COLUMNS} FROM auto_reviews WHERE task_id = ?1 \
                 ORDER BY created_at ASC, seq ASC"
            ),
            params![task_id],
            verdict_from_row,
        )
    }
}
