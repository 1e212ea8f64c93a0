use super::PmsStore;
use crate::{
    category::KpiCategory,
    error::PmsResult,
    model::{AccountMapping, ProductMapping},
};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

const MAPPING_COLUMNS: &str = "account_number, staff_id, branch_code, current_balance, june_balance,
     last_transaction_date, active_status, status, auto_balanced";

impl PmsStore {
    // ── Account mapping ─────────────────────────────────────────

    pub fn get_account_mapping(&self, account_number: &str) -> PmsResult<Option<AccountMapping>> {
        let sql = format!("SELECT {MAPPING_COLUMNS} FROM account_mapping WHERE account_number = ?1");
        let row = self
            .conn
            .query_row(&sql, params![account_number], Self::map_account_mapping_row)
            .optional()?;
        Ok(row)
    }

    pub fn insert_account_mapping(&self, m: &AccountMapping) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO account_mapping
                (account_number, staff_id, branch_code, current_balance, june_balance,
                 last_transaction_date, active_status, status, auto_balanced, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                m.account_number,
                m.staff_id,
                m.branch_code,
                m.current_balance,
                m.june_balance,
                m.last_transaction_date,
                m.active_status,
                m.status,
                m.auto_balanced,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Balance fields are last-writer-wins.
    pub fn update_mapping_balances(
        &self,
        account_number: &str,
        current_balance: f64,
        june_balance: f64,
        last_transaction_date: Option<NaiveDate>,
        active_status: bool,
    ) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE account_mapping
             SET current_balance = ?1, june_balance = ?2, last_transaction_date = ?3,
                 active_status = ?4, updated_at = ?5
             WHERE account_number = ?6",
            params![
                current_balance,
                june_balance,
                last_transaction_date,
                active_status,
                Utc::now(),
                account_number,
            ],
        )?;
        Ok(())
    }

    /// Conditional owner assignment: only succeeds while the current owner
    /// is still `expected_owner` (None = unowned). Returns false when another
    /// writer got there first.
    pub fn assign_account_owner(
        &self,
        account_number: &str,
        expected_owner: Option<&str>,
        new_owner: &str,
        auto_balanced: bool,
    ) -> PmsResult<bool> {
        let n = self.conn.execute(
            "UPDATE account_mapping
             SET staff_id = ?1, auto_balanced = ?2, status = 'Active', updated_at = ?3
             WHERE account_number = ?4 AND staff_id IS ?5",
            params![new_owner, auto_balanced, Utc::now(), account_number, expected_owner],
        )?;
        Ok(n == 1)
    }

    pub fn accounts_for_staff(&self, staff_id: &str) -> PmsResult<Vec<AccountMapping>> {
        let sql = format!(
            "SELECT {MAPPING_COLUMNS} FROM account_mapping WHERE staff_id = ?1 ORDER BY account_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![staff_id], Self::map_account_mapping_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Unowned Active accounts in a branch with at least `min_balance`.
    pub fn unowned_accounts_in_branch(
        &self,
        branch_code: &str,
        min_balance: f64,
    ) -> PmsResult<Vec<AccountMapping>> {
        let sql = format!(
            "SELECT {MAPPING_COLUMNS} FROM account_mapping
             WHERE branch_code = ?1 AND staff_id IS NULL AND status = 'Active'
               AND current_balance >= ?2
             ORDER BY account_number"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![branch_code, min_balance], Self::map_account_mapping_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mapped_account_count(&self, staff_id: &str) -> PmsResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM account_mapping WHERE staff_id = ?1 AND status = 'Active'",
            params![staff_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_account_mapping_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountMapping> {
        Ok(AccountMapping {
            account_number: row.get(0)?,
            staff_id: row.get(1)?,
            branch_code: row.get(2)?,
            current_balance: row.get(3)?,
            june_balance: row.get(4)?,
            last_transaction_date: row.get(5)?,
            active_status: row.get(6)?,
            status: row.get(7)?,
            auto_balanced: row.get(8)?,
        })
    }

    // ── Product → KPI category ──────────────────────────────────

    pub fn upsert_product_mapping(&self, p: &ProductMapping) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO product_mapping (product_name, kpi_category, active)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(product_name) DO UPDATE SET
                kpi_category = excluded.kpi_category,
                active = excluded.active",
            params![p.product_name, p.kpi_category, p.active],
        )?;
        Ok(())
    }

    pub fn active_product_mappings(&self) -> PmsResult<Vec<ProductMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT product_name, kpi_category, active FROM product_mapping
             WHERE active = 1 ORDER BY product_name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProductMapping {
                    product_name: row.get(0)?,
                    kpi_category: row.get::<_, KpiCategory>(1)?,
                    active: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
