use super::{json_column, PmsStore};
use crate::{
    error::PmsResult,
    model::{CbsDiscrepancy, CbsValidation, ValidationStatus},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

/// Header row written before processing starts.
#[derive(Debug, Clone)]
pub struct NewValidation<'a> {
    pub validation_id: &'a str,
    pub branch_code: &'a str,
    pub validation_date: NaiveDate,
    pub file_name: &'a str,
    pub uploaded_by: &'a str,
}

impl PmsStore {
    // ── CBS validations ──────────────────────────────────────────

    pub fn insert_validation(&self, v: &NewValidation<'_>) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO cbs_validation
                (validation_id, branch_code, validation_date, file_name, uploaded_by, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                v.validation_id,
                v.branch_code,
                v.validation_date,
                v.file_name,
                v.uploaded_by,
                ValidationStatus::Processing,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn set_validation_status(&self, validation_id: &str, status: ValidationStatus) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE cbs_validation SET status = ?1 WHERE validation_id = ?2",
            params![status, validation_id],
        )?;
        Ok(())
    }

    /// Persist totals and the discrepancy list of a finished validation.
    pub fn complete_validation(&self, v: &CbsValidation) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE cbs_validation
             SET total_records = ?1, matched_records = ?2, unmatched_records = ?3,
                 discrepancy_count = ?4, status = ?5, validation_rate = ?6,
                 unmapped_products = ?7, row_errors = ?8
             WHERE validation_id = ?9",
            params![
                v.total_records as i64,
                v.matched_records as i64,
                v.unmatched_records as i64,
                v.discrepancy_count as i64,
                v.status,
                v.validation_rate,
                serde_json::to_string(&v.unmapped_products)?,
                serde_json::to_string(&v.row_errors)?,
                v.validation_id,
            ],
        )?;
        self.conn.execute(
            "DELETE FROM cbs_discrepancy WHERE validation_id = ?1",
            params![v.validation_id],
        )?;
        for d in &v.discrepancies {
            self.insert_discrepancy(d)?;
        }
        Ok(())
    }

    fn insert_discrepancy(&self, d: &CbsDiscrepancy) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO cbs_discrepancy
                (discrepancy_id, validation_id, account_number, task_id, cbs_amount, pms_amount,
                 difference, discrepancy_type, resolved, resolution_note, resolved_by, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                d.discrepancy_id,
                d.validation_id,
                d.account_number,
                d.task_id,
                d.cbs_amount,
                d.pms_amount,
                d.difference,
                d.discrepancy_type,
                d.resolved,
                d.resolution_note,
                d.resolved_by,
                d.resolved_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_validation(&self, validation_id: &str) -> PmsResult<Option<CbsValidation>> {
        let validation = self
            .conn
            .query_row(
                "SELECT validation_id, branch_code, validation_date, file_name, uploaded_by,
                        total_records, matched_records, unmatched_records, discrepancy_count,
                        status, validation_rate, unmapped_products, row_errors, created_at
                 FROM cbs_validation WHERE validation_id = ?1",
                params![validation_id],
                |row| {
                    let unmapped: String = row.get(11)?;
                    let errors: String = row.get(12)?;
                    Ok(CbsValidation {
                        validation_id: row.get(0)?,
                        branch_code: row.get(1)?,
                        validation_date: row.get(2)?,
                        file_name: row.get(3)?,
                        uploaded_by: row.get(4)?,
                        total_records: row.get::<_, i64>(5)? as usize,
                        matched_records: row.get::<_, i64>(6)? as usize,
                        unmatched_records: row.get::<_, i64>(7)? as usize,
                        discrepancy_count: row.get::<_, i64>(8)? as usize,
                        status: row.get(9)?,
                        validation_rate: row.get(10)?,
                        unmapped_products: json_column(11, &unmapped)?,
                        row_errors: json_column(12, &errors)?,
                        discrepancies: Vec::new(),
                        created_at: row.get(13)?,
                    })
                },
            )
            .optional()?;
        match validation {
            Some(mut v) => {
                v.discrepancies = self.discrepancies_for(&v.validation_id)?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    pub fn discrepancies_for(&self, validation_id: &str) -> PmsResult<Vec<CbsDiscrepancy>> {
        let mut stmt = self.conn.prepare(
            "SELECT discrepancy_id, validation_id, account_number, task_id, cbs_amount, pms_amount,
                    difference, discrepancy_type, resolved, resolution_note, resolved_by, resolved_at
             FROM cbs_discrepancy WHERE validation_id = ?1
             ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![validation_id], Self::map_discrepancy_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_discrepancy(&self, discrepancy_id: &str) -> PmsResult<Option<CbsDiscrepancy>> {
        let row = self
            .conn
            .query_row(
                "SELECT discrepancy_id, validation_id, account_number, task_id, cbs_amount, pms_amount,
                        difference, discrepancy_type, resolved, resolution_note, resolved_by, resolved_at
                 FROM cbs_discrepancy WHERE discrepancy_id = ?1",
                params![discrepancy_id],
                Self::map_discrepancy_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Returns false when the discrepancy was already resolved.
    pub fn resolve_discrepancy(
        &self,
        discrepancy_id: &str,
        resolved_by: &str,
        note: &str,
        at: DateTime<Utc>,
    ) -> PmsResult<bool> {
        let n = self.conn.execute(
            "UPDATE cbs_discrepancy
             SET resolved = 1, resolution_note = ?1, resolved_by = ?2, resolved_at = ?3
             WHERE discrepancy_id = ?4 AND resolved = 0",
            params![note, resolved_by, at, discrepancy_id],
        )?;
        Ok(n == 1)
    }

    fn map_discrepancy_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CbsDiscrepancy> {
        Ok(CbsDiscrepancy {
            discrepancy_id: row.get(0)?,
            validation_id: row.get(1)?,
            account_number: row.get(2)?,
            task_id: row.get(3)?,
            cbs_amount: row.get(4)?,
            pms_amount: row.get(5)?,
            difference: row.get(6)?,
            discrepancy_type: row.get(7)?,
            resolved: row.get(8)?,
            resolution_note: row.get(9)?,
            resolved_by: row.get(10)?,
            resolved_at: row.get(11)?,
        })
    }
}
