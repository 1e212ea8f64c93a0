use super::PmsStore;
use crate::{
    error::PmsResult,
    model::{BaselineBalance, BaselinePeriodSummary},
};
use rusqlite::{params, OptionalExtension};

impl PmsStore {
    // ── Baseline balances ────────────────────────────────────────

    /// Upsert keyed by (account_id, period). Returns true when a new row
    /// was inserted. The active flag of an existing row is left alone.
    pub fn upsert_baseline(&self, b: &BaselineBalance) -> PmsResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM baseline_balance WHERE account_id = ?1 AND period = ?2",
            params![b.account_id, b.period],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO baseline_balance
                (account_id, alt_account_number, branch_code, balance, period, baseline_date, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account_id, period) DO UPDATE SET
                alt_account_number = COALESCE(excluded.alt_account_number, alt_account_number),
                branch_code = COALESCE(excluded.branch_code, branch_code),
                balance = excluded.balance,
                baseline_date = excluded.baseline_date",
            params![
                b.account_id,
                b.alt_account_number,
                b.branch_code,
                b.balance,
                b.period,
                b.baseline_date,
                b.is_active,
            ],
        )?;
        Ok(!exists)
    }

    pub fn baseline_period_row_count(&self, period: &str) -> PmsResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM baseline_balance WHERE period = ?1",
            params![period],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Clear every active flag. Returns rows changed.
    pub fn deactivate_all_baselines(&self) -> PmsResult<usize> {
        let n = self
            .conn
            .execute("UPDATE baseline_balance SET is_active = 0 WHERE is_active = 1", [])?;
        Ok(n)
    }

    pub fn set_baseline_period_active(&self, period: &str, active: bool) -> PmsResult<usize> {
        let n = self.conn.execute(
            "UPDATE baseline_balance SET is_active = ?1 WHERE period = ?2",
            params![active, period],
        )?;
        Ok(n)
    }

    /// Distinct periods that currently have an active row.
    pub fn active_baseline_periods(&self) -> PmsResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT period FROM baseline_balance WHERE is_active = 1 ORDER BY period",
        )?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn baseline_periods(&self) -> PmsResult<Vec<BaselinePeriodSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT period, COUNT(*), COALESCE(SUM(balance), 0.0), MAX(is_active)
             FROM baseline_balance GROUP BY period ORDER BY period",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BaselinePeriodSummary {
                    period: row.get(0)?,
                    accounts: row.get(1)?,
                    total_balance: row.get(2)?,
                    is_active: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Active baseline for an account, matched on account id or on the
    /// alternate account number.
    pub fn active_baseline_for(&self, account: &str) -> PmsResult<Option<BaselineBalance>> {
        let row = self
            .conn
            .query_row(
                "SELECT account_id, alt_account_number, branch_code, balance, period, baseline_date, is_active
                 FROM baseline_balance
                 WHERE is_active = 1 AND (account_id = ?1 OR alt_account_number = ?1)
                 ORDER BY CASE WHEN account_id = ?1 THEN 0 ELSE 1 END
                 LIMIT 1",
                params![account],
                |row| {
                    Ok(BaselineBalance {
                        account_id: row.get(0)?,
                        alt_account_number: row.get(1)?,
                        branch_code: row.get(2)?,
                        balance: row.get(3)?,
                        period: row.get(4)?,
                        baseline_date: row.get(5)?,
                        is_active: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
