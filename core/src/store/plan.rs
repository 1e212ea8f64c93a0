use super::PmsStore;
use crate::{
    category::KpiCategory,
    error::PmsResult,
    model::{Plan, PlanStatus, ShareConfig, StaffPlan},
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

const STAFF_PLAN_COLUMNS: &str = "staff_plan_id, plan_id, staff_id, position, kpi_category, period,
     individual_target, yearly_target, monthly_target, weekly_target, daily_target,
     share_percent, status";

impl PmsStore {
    // ── Plans ─────────────────────────────────────────────────────

    pub fn insert_plan(&self, p: &Plan) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO plan
                (plan_id, branch_code, kpi_category, period, target_value, target_type, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                p.plan_id,
                p.branch_code,
                p.kpi_category,
                p.period,
                p.target_value,
                p.target_type,
                p.status,
                p.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_plan(&self, plan_id: &str) -> PmsResult<Option<Plan>> {
        let plan = self
            .conn
            .query_row(
                "SELECT plan_id, branch_code, kpi_category, period, target_value, target_type, status, created_at
                 FROM plan WHERE plan_id = ?1",
                params![plan_id],
                |row| {
                    Ok(Plan {
                        plan_id: row.get(0)?,
                        branch_code: row.get(1)?,
                        kpi_category: row.get(2)?,
                        period: row.get(3)?,
                        target_value: row.get(4)?,
                        target_type: row.get(5)?,
                        status: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(plan)
    }

    /// Whether a Draft/Active plan already exists for the key.
    pub fn open_plan_exists(
        &self,
        branch_code: &str,
        category: KpiCategory,
        period: &str,
    ) -> PmsResult<bool> {
        let exists = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM plan
             WHERE branch_code = ?1 AND kpi_category = ?2 AND period = ?3
               AND status IN ('Draft', 'Active')",
            params![branch_code, category, period],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn update_plan_target(&self, plan_id: &str, target_value: f64) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE plan SET target_value = ?1 WHERE plan_id = ?2",
            params![target_value, plan_id],
        )?;
        Ok(())
    }

    pub fn update_plan_status(&self, plan_id: &str, status: PlanStatus) -> PmsResult<()> {
        self.conn.execute(
            "UPDATE plan SET status = ?1 WHERE plan_id = ?2",
            params![status, plan_id],
        )?;
        self.conn.execute(
            "UPDATE staff_plan SET status = ?1 WHERE plan_id = ?2",
            params![status, plan_id],
        )?;
        Ok(())
    }

    // ── Share configuration ──────────────────────────────────────

    pub fn insert_share_config(&self, c: &ShareConfig) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO plan_share_config
                (config_id, branch_code, kpi_category, branch_manager, msm, accountant, mso,
                 total_percent, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                c.config_id,
                c.branch_code,
                c.kpi_category,
                c.branch_manager,
                c.msm,
                c.accountant,
                c.mso,
                c.total_percent,
                c.active,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Deactivate the active config for exactly this (branch, category);
    /// a None branch addresses the default config only.
    pub fn deactivate_share_configs(
        &self,
        branch_code: Option<&str>,
        category: KpiCategory,
    ) -> PmsResult<usize> {
        let n = self.conn.execute(
            "UPDATE plan_share_config SET active = 0
             WHERE kpi_category = ?1 AND branch_code IS ?2 AND active = 1",
            params![category, branch_code],
        )?;
        Ok(n)
    }

    /// The active config for exactly this (branch, category).
    pub fn active_share_config(
        &self,
        branch_code: Option<&str>,
        category: KpiCategory,
    ) -> PmsResult<Option<ShareConfig>> {
        let row = self
            .conn
            .query_row(
                "SELECT config_id, branch_code, kpi_category, branch_manager, msm, accountant, mso,
                        total_percent, active
                 FROM plan_share_config
                 WHERE kpi_category = ?1 AND branch_code IS ?2 AND active = 1
                 ORDER BY created_at DESC LIMIT 1",
                params![category, branch_code],
                |row| {
                    Ok(ShareConfig {
                        config_id: row.get(0)?,
                        branch_code: row.get(1)?,
                        kpi_category: row.get(2)?,
                        branch_manager: row.get(3)?,
                        msm: row.get(4)?,
                        accountant: row.get(5)?,
                        mso: row.get(6)?,
                        total_percent: row.get(7)?,
                        active: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ── Staff plans ──────────────────────────────────────────────

    pub fn delete_staff_plans_for_plan(&self, plan_id: &str) -> PmsResult<usize> {
        let n = self
            .conn
            .execute("DELETE FROM staff_plan WHERE plan_id = ?1", params![plan_id])?;
        Ok(n)
    }

    pub fn insert_staff_plan(&self, sp: &StaffPlan) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO staff_plan
                (staff_plan_id, plan_id, staff_id, position, kpi_category, period,
                 individual_target, yearly_target, monthly_target, weekly_target, daily_target,
                 share_percent, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                sp.staff_plan_id,
                sp.plan_id,
                sp.staff_id,
                sp.position,
                sp.kpi_category,
                sp.period,
                sp.individual_target,
                sp.yearly_target,
                sp.monthly_target,
                sp.weekly_target,
                sp.daily_target,
                sp.share_percent,
                sp.status,
            ],
        )?;
        Ok(())
    }

    pub fn staff_plans_for_plan(&self, plan_id: &str) -> PmsResult<Vec<StaffPlan>> {
        let sql = format!(
            "SELECT {STAFF_PLAN_COLUMNS} FROM staff_plan WHERE plan_id = ?1 ORDER BY staff_plan_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![plan_id], Self::map_staff_plan_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Staff plans for a staff member and period, excluding cancelled plans.
    pub fn staff_plans_for(&self, staff_id: &str, period: &str) -> PmsResult<Vec<StaffPlan>> {
        let sql = format!(
            "SELECT {STAFF_PLAN_COLUMNS} FROM staff_plan
             WHERE staff_id = ?1 AND period = ?2 AND status != 'Cancelled'
             ORDER BY kpi_category, staff_plan_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![staff_id, period], Self::map_staff_plan_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_staff_plan_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StaffPlan> {
        Ok(StaffPlan {
            staff_plan_id: row.get(0)?,
            plan_id: row.get(1)?,
            staff_id: row.get(2)?,
            position: row.get(3)?,
            kpi_category: row.get(4)?,
            period: row.get(5)?,
            individual_target: row.get(6)?,
            yearly_target: row.get(7)?,
            monthly_target: row.get(8)?,
            weekly_target: row.get(9)?,
            daily_target: row.get(10)?,
            share_percent: row.get(11)?,
            status: row.get(12)?,
        })
    }
}
