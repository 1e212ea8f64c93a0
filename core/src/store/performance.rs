use super::{json_column, PmsStore};
use crate::{
    approval::{ApprovalChain, ApprovalStatus},
    error::PmsResult,
    model::{BehavioralEvaluation, PerformanceScore, ScoreStatus},
    period::Period,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const EVALUATION_COLUMNS: &str = "evaluation_id, staff_id, evaluator_id, branch_code, period,
     competencies, total_score, approval_status, approval_chain, revision, created_at";

const SCORE_COLUMNS: &str = "score_id, staff_id, branch_code, period_type, year, half, quarter, month,
     kpi_scores, kpi_total_score, behavioral_score, evaluation_id, final_score, rating, status,
     is_locked, locked_at, updated_at";

impl PmsStore {
    // ── Behavioral evaluations ───────────────────────────────────

    pub fn insert_evaluation(&self, e: &BehavioralEvaluation) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO behavioral_evaluation
                (evaluation_id, staff_id, evaluator_id, branch_code, period, competencies,
                 total_score, approval_status, approval_chain, revision, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                e.evaluation_id,
                e.staff_id,
                e.evaluator_id,
                e.branch_code,
                e.period,
                serde_json::to_string(&e.competencies)?,
                e.total_score,
                e.approval_status,
                serde_json::to_string(&e.approval_chain)?,
                e.revision,
                e.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_evaluation(&self, evaluation_id: &str) -> PmsResult<Option<BehavioralEvaluation>> {
        let sql = format!("SELECT {EVALUATION_COLUMNS} FROM behavioral_evaluation WHERE evaluation_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![evaluation_id], Self::map_evaluation_row)
            .optional()?;
        Ok(row)
    }

    /// Same optimistic check as tasks: false when the revision moved on.
    pub fn update_evaluation_approval(
        &self,
        evaluation_id: &str,
        expected_revision: i64,
        chain: &ApprovalChain,
        status: ApprovalStatus,
    ) -> PmsResult<bool> {
        let n = self.conn.execute(
            "UPDATE behavioral_evaluation
             SET approval_chain = ?1, approval_status = ?2, revision = revision + 1
             WHERE evaluation_id = ?3 AND revision = ?4",
            params![serde_json::to_string(chain)?, status, evaluation_id, expected_revision],
        )?;
        Ok(n == 1)
    }

    /// Latest approved evaluation of a staff member for a period label.
    pub fn approved_evaluation_for(&self, staff_id: &str, period: &str) -> PmsResult<Option<BehavioralEvaluation>> {
        let sql = format!(
            "SELECT {EVALUATION_COLUMNS} FROM behavioral_evaluation
             WHERE staff_id = ?1 AND period = ?2 AND approval_status = 'Approved'
             ORDER BY created_at DESC, evaluation_id DESC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![staff_id, period], Self::map_evaluation_row)
            .optional()?;
        Ok(row)
    }

    /// A Pending or Approved evaluation of a staff member for a period label.
    pub fn live_evaluation_for(&self, staff_id: &str, period: &str) -> PmsResult<Option<BehavioralEvaluation>> {
        let sql = format!(
            "SELECT {EVALUATION_COLUMNS} FROM behavioral_evaluation
             WHERE staff_id = ?1 AND period = ?2 AND approval_status IN ('Pending', 'Approved')
             ORDER BY created_at ASC, evaluation_id ASC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![staff_id, period], Self::map_evaluation_row)
            .optional()?;
        Ok(row)
    }

    pub fn pending_evaluations_in_branch(&self, branch_code: &str) -> PmsResult<Vec<BehavioralEvaluation>> {
        let sql = format!(
            "SELECT {EVALUATION_COLUMNS} FROM behavioral_evaluation
             WHERE branch_code = ?1 AND approval_status = 'Pending'
             ORDER BY created_at ASC, evaluation_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![branch_code], Self::map_evaluation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_evaluation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BehavioralEvaluation> {
        let competencies: String = row.get(5)?;
        let chain: String = row.get(8)?;
        Ok(BehavioralEvaluation {
            evaluation_id: row.get(0)?,
            staff_id: row.get(1)?,
            evaluator_id: row.get(2)?,
            branch_code: row.get(3)?,
            period: row.get(4)?,
            competencies: json_column(5, &competencies)?,
            total_score: row.get(6)?,
            approval_status: row.get(7)?,
            approval_chain: json_column(8, &chain)?,
            revision: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    // ── Performance scores ───────────────────────────────────────

    pub fn get_score(&self, staff_id: &str, period: &Period) -> PmsResult<Option<PerformanceScore>> {
        let (half, quarter, month) = period.components();
        let sql = format!(
            "SELECT {SCORE_COLUMNS} FROM performance_score
             WHERE staff_id = ?1 AND period_type = ?2 AND year = ?3
               AND half = ?4 AND quarter = ?5 AND month = ?6"
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![staff_id, period.period_type(), period.year(), half, quarter, month],
                Self::map_score_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_score_by_id(&self, score_id: &str) -> PmsResult<Option<PerformanceScore>> {
        let sql = format!("SELECT {SCORE_COLUMNS} FROM performance_score WHERE score_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![score_id], Self::map_score_row)
            .optional()?;
        Ok(row)
    }

    /// Insert or replace by (staff, period). Locked rows are never touched;
    /// returns false in that case.
    pub fn upsert_score(&self, s: &PerformanceScore) -> PmsResult<bool> {
        let (half, quarter, month) = s.period.components();
        let n = self.conn.execute(
            "INSERT INTO performance_score
                (score_id, staff_id, branch_code, period_type, year, half, quarter, month,
                 kpi_scores, kpi_total_score, behavioral_score, evaluation_id, final_score,
                 rating, status, is_locked, locked_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT (staff_id, period_type, year, half, quarter, month) DO UPDATE SET
                branch_code = excluded.branch_code,
                kpi_scores = excluded.kpi_scores,
                kpi_total_score = excluded.kpi_total_score,
                behavioral_score = excluded.behavioral_score,
                evaluation_id = excluded.evaluation_id,
                final_score = excluded.final_score,
                rating = excluded.rating,
                status = excluded.status,
                is_locked = excluded.is_locked,
                locked_at = excluded.locked_at,
                updated_at = excluded.updated_at
             WHERE performance_score.is_locked = 0",
            params![
                s.score_id,
                s.staff_id,
                s.branch_code,
                s.period.period_type(),
                s.period.year(),
                half,
                quarter,
                month,
                serde_json::to_string(&s.kpi_scores)?,
                s.kpi_total_score,
                s.behavioral_score,
                s.evaluation_id,
                s.final_score,
                s.rating,
                s.status,
                s.is_locked,
                s.locked_at,
                s.updated_at,
            ],
        )?;
        Ok(n == 1)
    }

    pub fn set_score_status(&self, score_id: &str, status: ScoreStatus, at: DateTime<Utc>) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE performance_score SET status = ?1, updated_at = ?2 WHERE score_id = ?3",
            params![status, at, score_id],
        )?;
        Ok(())
    }

    fn map_score_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PerformanceScore> {
        let period_type: String = row.get(3)?;
        let year: i32 = row.get(4)?;
        let half: u8 = row.get(5)?;
        let quarter: u8 = row.get(6)?;
        let month: u8 = row.get(7)?;
        let period = Period::from_components(&period_type, year, half, quarter, month).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
            )
        })?;
        let kpi_scores: String = row.get(8)?;
        Ok(PerformanceScore {
            score_id: row.get(0)?,
            staff_id: row.get(1)?,
            branch_code: row.get(2)?,
            period,
            kpi_scores: json_column(8, &kpi_scores)?,
            kpi_total_score: row.get(9)?,
            behavioral_score: row.get(10)?,
            evaluation_id: row.get(11)?,
            final_score: row.get(12)?,
            rating: row.get(13)?,
            status: row.get(14)?,
            is_locked: row.get(15)?,
            locked_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}
