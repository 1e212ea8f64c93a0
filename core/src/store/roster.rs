use super::PmsStore;
use crate::{
    error::PmsResult,
    model::{Branch, Staff},
    position::Position,
};
use rusqlite::{params, OptionalExtension};

impl PmsStore {
    // ── Branches ──────────────────────────────────────────────────

    pub fn upsert_branch(&self, branch: &Branch) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO branch (branch_code, name, area_code, region_code)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(branch_code) DO UPDATE SET
                name = excluded.name,
                area_code = excluded.area_code,
                region_code = excluded.region_code",
            params![branch.branch_code, branch.name, branch.area_code, branch.region_code],
        )?;
        Ok(())
    }

    pub fn get_branch(&self, branch_code: &str) -> PmsResult<Option<Branch>> {
        let branch = self
            .conn
            .query_row(
                "SELECT branch_code, name, area_code, region_code FROM branch WHERE branch_code = ?1",
                params![branch_code],
                |row| {
                    Ok(Branch {
                        branch_code: row.get(0)?,
                        name: row.get(1)?,
                        area_code: row.get(2)?,
                        region_code: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(branch)
    }

    pub fn branches_in_area(&self, area_code: &str) -> PmsResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT branch_code FROM branch WHERE area_code = ?1 ORDER BY branch_code")?;
        let rows = stmt
            .query_map(params![area_code], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Staff ─────────────────────────────────────────────────────

    pub fn upsert_staff(&self, staff: &Staff) -> PmsResult<()> {
        self.conn.execute(
            "INSERT INTO staff (staff_id, name, position, branch_code, area_code, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(staff_id) DO UPDATE SET
                name = excluded.name,
                position = excluded.position,
                branch_code = excluded.branch_code,
                area_code = excluded.area_code,
                active = excluded.active",
            params![
                staff.staff_id,
                staff.name,
                staff.position,
                staff.branch_code,
                staff.area_code,
                staff.active,
            ],
        )?;
        Ok(())
    }

    pub fn set_staff_active(&self, staff_id: &str, active: bool) -> PmsResult<usize> {
        let n = self.conn.execute(
            "UPDATE staff SET active = ?1 WHERE staff_id = ?2",
            params![active, staff_id],
        )?;
        Ok(n)
    }

    pub fn get_staff(&self, staff_id: &str) -> PmsResult<Option<Staff>> {
        let staff = self
            .conn
            .query_row(
                "SELECT staff_id, name, position, branch_code, area_code, active
                 FROM staff WHERE staff_id = ?1",
                params![staff_id],
                Self::map_staff_row,
            )
            .optional()?;
        Ok(staff)
    }

    /// Active staff of a branch, ordered by staff id so that every roster
    /// read is deterministic.
    pub fn active_staff_in_branch(&self, branch_code: &str) -> PmsResult<Vec<Staff>> {
        let mut stmt = self.conn.prepare(
            "SELECT staff_id, name, position, branch_code, area_code, active
             FROM staff WHERE branch_code = ?1 AND active = 1
             ORDER BY staff_id ASC",
        )?;
        let rows = stmt
            .query_map(params![branch_code], Self::map_staff_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// First active holder of `position` in the branch.
    pub fn first_active_in_branch(
        &self,
        branch_code: &str,
        position: Position,
    ) -> PmsResult<Option<Staff>> {
        let staff = self
            .conn
            .query_row(
                "SELECT staff_id, name, position, branch_code, area_code, active
                 FROM staff
                 WHERE branch_code = ?1 AND position = ?2 AND active = 1
                 ORDER BY staff_id ASC LIMIT 1",
                params![branch_code, position],
                Self::map_staff_row,
            )
            .optional()?;
        Ok(staff)
    }

    pub fn first_active_in_area(
        &self,
        area_code: &str,
        position: Position,
    ) -> PmsResult<Option<Staff>> {
        let staff = self
            .conn
            .query_row(
                "SELECT staff_id, name, position, branch_code, area_code, active
                 FROM staff
                 WHERE area_code = ?1 AND position = ?2 AND active = 1
                 ORDER BY staff_id ASC LIMIT 1",
                params![area_code, position],
                Self::map_staff_row,
            )
            .optional()?;
        Ok(staff)
    }

    fn map_staff_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Staff> {
        Ok(Staff {
            staff_id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            branch_code: row.get(3)?,
            area_code: row.get(4)?,
            active: row.get(5)?,
        })
    }
}
