//! Organization roster: branches and staff.
//!
//! Reference data for cascade eligibility and approval-chain resolution.

use crate::{
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{Branch, Staff},
    position::{Actor, Position},
    subsystem::{require_admin, Ctx, Outcome},
};

pub struct RosterSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> RosterSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    pub fn upsert_branch(&self, actor: &Actor, branch: Branch) -> PmsResult<Outcome<Branch>> {
        require_admin(actor, "manage branches")?;
        if branch.branch_code.trim().is_empty() {
            return Err(PmsError::validation("branch_code is required"));
        }
        self.ctx.store.upsert_branch(&branch)?;
        let event = AuditEvent::BranchSaved {
            branch_code: branch.branch_code.clone(),
            area_code: branch.area_code.clone(),
        };
        Ok(Outcome::single(branch, event))
    }

    pub fn upsert_staff(&self, actor: &Actor, mut staff: Staff) -> PmsResult<Outcome<Staff>> {
        require_admin(actor, "manage staff")?;
        if staff.staff_id.trim().is_empty() {
            return Err(PmsError::validation("staff_id is required"));
        }
        // Branch staff inherit their area from the branch record.
        if let Some(code) = staff.branch_code.as_deref() {
            let branch = self
                .ctx
                .store
                .get_branch(code)?
                .ok_or_else(|| PmsError::not_found("branch", code))?;
            if staff.area_code.is_none() {
                staff.area_code = Some(branch.area_code);
            }
        }
        self.ctx.store.upsert_staff(&staff)?;
        log::debug!("saved staff {} as {}", staff.staff_id, staff.position);
        let event = AuditEvent::StaffSaved {
            staff_id: staff.staff_id.clone(),
            position: staff.position.display().to_string(),
            branch_code: staff.branch_code.clone(),
        };
        Ok(Outcome::single(staff, event))
    }

    pub fn deactivate_staff(&self, actor: &Actor, staff_id: &str) -> PmsResult<Outcome<()>> {
        require_admin(actor, "manage staff")?;
        if self.ctx.store.set_staff_active(staff_id, false)? == 0 {
            return Err(PmsError::not_found("staff", staff_id));
        }
        Ok(Outcome::single((), AuditEvent::StaffDeactivated { staff_id: staff_id.to_string() }))
    }

    /// Active staff in a branch holding one of `positions` (all when empty).
    pub fn active_staff_in_branch(&self, branch_code: &str, positions: &[Position]) -> PmsResult<Vec<Staff>> {
        let staff = self.ctx.store.active_staff_in_branch(branch_code)?;
        Ok(staff
            .into_iter()
            .filter(|s| positions.is_empty() || positions.contains(&s.position))
            .collect())
    }

    pub fn area_manager_for_branch(&self, branch_code: &str) -> PmsResult<Option<Staff>> {
        let branch = self
            .ctx
            .store
            .get_branch(branch_code)?
            .ok_or_else(|| PmsError::not_found("branch", branch_code))?;
        self.ctx
            .store
            .first_active_in_area(&branch.area_code, Position::AreaManager)
    }
}
