use super::{json_column, PmsStore};
use crate::{
    approval::{ApprovalChain, ApprovalStatus},
    category::TaskType,
    error::PmsResult,
    model::{DailyTask, MappingStatus},
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

const TASK_COLUMNS: &str = "task_id, task_type, account_number, amount, submitter_id, branch_code,
     mapping_status, kpi_eligible, approval_status, approval_chain, cbs_validated,
     validation_ref, task_date, revision, created_at";

impl PmsStore {
    // ── Daily tasks ──────────────────────────────────────────────

    pub fn insert_task(&self, t: &DailyTask) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO daily_task
                (task_id, task_type, account_number, amount, submitter_id, branch_code,
                 mapping_status, kpi_eligible, approval_status, approval_chain, cbs_validated,
                 validation_ref, task_date, revision, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                t.task_id,
                t.task_type,
                t.account_number,
                t.amount,
                t.submitter_id,
                t.branch_code,
                t.mapping_status,
                t.kpi_eligible,
                t.approval_status,
                serde_json::to_string(&t.approval_chain)?,
                t.cbs_validated,
                t.validation_ref,
                t.task_date,
                t.revision,
                t.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> PmsResult<Option<DailyTask>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM daily_task WHERE task_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![task_id], Self::map_task_row)
            .optional()?;
        Ok(row)
    }

    /// Write a new chain/status only if nobody else changed the task since
    /// `expected_revision` was read. Returns false on a lost race.
    pub fn update_task_approval(
        &self,
        task_id: &str,
        expected_revision: i64,
        chain: &ApprovalChain,
        status: ApprovalStatus,
    ) -> PmsResult<bool> {
        let n = self.conn.execute(
            "UPDATE daily_task
             SET approval_chain = ?1, approval_status = ?2, revision = revision + 1
             WHERE task_id = ?3 AND revision = ?4",
            params![serde_json::to_string(chain)?, status, task_id, expected_revision],
        )?;
        Ok(n == 1)
    }

    pub fn set_task_mapping_status(&self, task_id: &str, status: MappingStatus) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE daily_task SET mapping_status = ?1, revision = revision + 1 WHERE task_id = ?2",
            params![status, task_id],
        )?;
        Ok(())
    }

    pub fn mark_task_validated(&self, task_id: &str, validation_ref: &str) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE daily_task SET cbs_validated = 1, validation_ref = ?1, revision = revision + 1
             WHERE task_id = ?2",
            params![validation_ref, task_id],
        )?;
        Ok(())
    }

    /// Approved tasks for a branch on one date, oldest first.
    pub fn approved_tasks_on(&self, branch_code: &str, date: NaiveDate) -> PmsResult<Vec<DailyTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM daily_task
             WHERE branch_code = ?1 AND task_date = ?2 AND approval_status = 'Approved'
             ORDER BY created_at ASC, task_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![branch_code, date], Self::map_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Approved, unmapped task for the account on the date, if any.
    pub fn approved_unmapped_task_for(
        &self,
        account_number: &str,
        branch_code: &str,
        date: NaiveDate,
    ) -> PmsResult<Option<DailyTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM daily_task
             WHERE account_number = ?1 AND branch_code = ?2 AND task_date = ?3
               AND approval_status = 'Approved' AND mapping_status = 'Unmapped'
             ORDER BY created_at ASC, task_id ASC LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![account_number, branch_code, date], Self::map_task_row)
            .optional()?;
        Ok(row)
    }

    /// Approved, CBS-validated and KPI-eligible tasks of one type for a submitter.
    pub fn validated_tasks_for(&self, submitter_id: &str, task_type: TaskType) -> PmsResult<Vec<DailyTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM daily_task
             WHERE submitter_id = ?1 AND task_type = ?2
               AND approval_status = 'Approved' AND cbs_validated = 1
               AND kpi_eligible = 1
             ORDER BY task_date ASC, task_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![submitter_id, task_type], Self::map_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Pending tasks in a branch; callers filter on chain membership.
    pub fn pending_tasks_in_branch(&self, branch_code: &str) -> PmsResult<Vec<DailyTask>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM daily_task
             WHERE branch_code = ?1 AND approval_status = 'Pending'
             ORDER BY task_date ASC, task_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![branch_code], Self::map_task_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyTask> {
        let chain_json: String = row.get(9)?;
        Ok(DailyTask {
            task_id: row.get(0)?,
            task_type: row.get(1)?,
            account_number: row.get(2)?,
            amount: row.get(3)?,
            submitter_id: row.get(4)?,
            branch_code: row.get(5)?,
            mapping_status: row.get(6)?,
            kpi_eligible: row.get(7)?,
            approval_status: row.get(8)?,
            approval_chain: json_column(9, &chain_json)?,
            cbs_validated: row.get(10)?,
            validation_ref: row.get(11)?,
            task_date: row.get(12)?,
            revision: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}
