//! Branch plans and their cascade into staff-level targets.
//!
//! Cascade is full replacement: delete every StaffPlan of the plan, then
//! insert the freshly computed set, inside one transaction. Staff-plan ids
//! are `{plan_id}:{staff_id}`, so re-running an unchanged cascade reproduces
//! identical rows.

use crate::{
    category::KpiCategory,
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{Plan, PlanStatus, ShareConfig, Staff, StaffPlan},
    period::Period,
    position::Actor,
    subsystem::{require_admin, Ctx, Outcome},
    types::{new_id, round2, BranchCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const TARGET_TYPE_INCREMENTAL: &str = "incremental";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanInput {
    pub branch_code: BranchCode,
    pub kpi_category: KpiCategory,
    pub period: String,
    pub target_value: f64,
    /// Draft or Active; defaults to Active.
    #[serde(default)]
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfigInput {
    #[serde(default)]
    pub branch_code: Option<BranchCode>,
    pub kpi_category: KpiCategory,
    pub branch_manager: f64,
    pub msm: f64,
    pub accountant: f64,
    pub mso: f64,
}

/// Split `plan` across `roster` according to `config`.
///
/// Named positions get their configured share each; the MSO pool share is
/// divided equally between pool members. Zero shares produce no row.
pub fn cascade_targets(plan: &Plan, config: &ShareConfig, roster: &[Staff]) -> PmsResult<Vec<StaffPlan>> {
    let period = Period::parse(&plan.period)?;
    let divisors = period.divisors();

    let eligible: Vec<&Staff> = roster
        .iter()
        .filter(|s| s.active && s.position.is_plan_eligible())
        .collect();
    let (pool, named): (Vec<&Staff>, Vec<&Staff>) = eligible.into_iter().partition(|s| s.position.is_mso());

    let mut shares: Vec<(&Staff, f64)> = named
        .into_iter()
        .map(|s| (s, config.share_for(s.position)))
        .filter(|(_, share)| *share > 0.0)
        .collect();
    if !pool.is_empty() && config.mso > 0.0 {
        let each = config.mso / pool.len() as f64;
        shares.extend(pool.into_iter().map(|s| (s, each)));
    }

    let mut plans: Vec<StaffPlan> = shares
        .into_iter()
        .map(|(staff, share)| {
            let individual = plan.target_value * share / 100.0;
            StaffPlan {
                staff_plan_id: format!("{}:{}", plan.plan_id, staff.staff_id),
                plan_id: plan.plan_id.clone(),
                staff_id: staff.staff_id.clone(),
                position: staff.position,
                kpi_category: plan.kpi_category,
                period: plan.period.clone(),
                individual_target: individual,
                yearly_target: round2(individual * 12.0 / f64::from(divisors.months)),
                monthly_target: round2(individual / f64::from(divisors.months)),
                weekly_target: round2(individual / f64::from(divisors.weeks)),
                daily_target: round2(individual / f64::from(divisors.days)),
                share_percent: share,
                status: plan.status,
            }
        })
        .collect();
    plans.sort_by(|a, b| a.staff_plan_id.cmp(&b.staff_plan_id));
    Ok(plans)
}

pub struct PlanCascadeSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> PlanCascadeSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    // ── Share configuration ───────────────────────────────────────

    pub fn save_share_config(&self, actor: &Actor, input: ShareConfigInput) -> PmsResult<Outcome<ShareConfig>> {
        require_admin(actor, "configure plan shares")?;
        let shares = [
            ("Branch Manager", input.branch_manager),
            ("MSM", input.msm),
            ("Accountant", input.accountant),
            ("MSO", input.mso),
        ];
        for (label, share) in shares {
            if !share.is_finite() || !(0.0..=100.0).contains(&share) {
                return Err(PmsError::validation(format!("{label} share {share} must be within 0..=100")));
            }
        }
        let total = shares.iter().map(|(_, s)| s).sum::<f64>();
        if total > 100.0 + 1e-9 {
            return Err(PmsError::validation(format!("shares total {total}% exceeds 100%")));
        }
        let branch_code = input
            .branch_code
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());

        let config = ShareConfig {
            config_id: new_id(),
            branch_code,
            kpi_category: input.kpi_category,
            branch_manager: input.branch_manager,
            msm: input.msm,
            accountant: input.accountant,
            mso: input.mso,
            total_percent: round2(total),
            active: true,
        };
        self.ctx.store.with_transaction(|store| {
            store.deactivate_share_configs(config.branch_code.as_deref(), config.kpi_category)?;
            store.insert_share_config(&config)
        })?;

        let event = AuditEvent::ShareConfigSaved {
            config_id: config.config_id.clone(),
            branch_code: config.branch_code.clone(),
            kpi_category: config.kpi_category,
            total_percent: config.total_percent,
        };
        Ok(Outcome::single(config, event))
    }

    /// Branch-specific config first, then the default for the category.
    pub fn resolve_share_config(&self, branch_code: &str, category: KpiCategory) -> PmsResult<ShareConfig> {
        let store = self.ctx.store;
        if let Some(config) = store.active_share_config(Some(branch_code), category)? {
            return Ok(config);
        }
        store
            .active_share_config(None, category)?
            .ok_or_else(|| PmsError::ConfigurationMissing {
                category: category.code().to_string(),
                branch_code: branch_code.to_string(),
            })
    }

    // ── Plans ─────────────────────────────────────────────────────

    /// Insert a plan and cascade it. Nothing is kept if the cascade fails.
    pub fn create_plan(&self, actor: &Actor, input: PlanInput) -> PmsResult<Outcome<Plan>> {
        require_admin(actor, "create plans")?;
        if !input.target_value.is_finite() || input.target_value <= 0.0 {
            return Err(PmsError::validation("target_value must be greater than zero"));
        }
        let period = Period::parse(&input.period)?;
        let status = input.status.unwrap_or(PlanStatus::Active);
        if status.is_terminal() {
            return Err(PmsError::validation(format!("a plan cannot start as {}", status.as_str())));
        }
        let store = self.ctx.store;
        if store.get_branch(&input.branch_code)?.is_none() {
            return Err(PmsError::not_found("branch", &input.branch_code));
        }

        let plan = Plan {
            plan_id: new_id(),
            branch_code: input.branch_code,
            kpi_category: input.kpi_category,
            period: period.label(),
            target_value: input.target_value,
            target_type: TARGET_TYPE_INCREMENTAL.to_string(),
            status,
            created_at: Utc::now(),
        };

        let cascaded = store.with_transaction(|store| {
            if store.open_plan_exists(&plan.branch_code, plan.kpi_category, &plan.period)? {
                return Err(PmsError::conflict(format!(
                    "an open {} plan already exists for {} {}",
                    plan.kpi_category, plan.branch_code, plan.period
                )));
            }
            store.insert_plan(&plan)?;
            self.cascade(&plan)
        })?;

        let mut events = vec![AuditEvent::PlanCreated {
            plan_id: plan.plan_id.clone(),
            branch_code: plan.branch_code.clone(),
            kpi_category: plan.kpi_category,
            period: plan.period.clone(),
            target_value: plan.target_value,
        }];
        events.push(cascaded_event(&plan.plan_id, &cascaded));
        Ok(Outcome::new(plan, events))
    }

    /// Change the target; the plan is recascaded only when the value moved.
    pub fn update_plan_target(&self, actor: &Actor, plan_id: &str, target_value: f64) -> PmsResult<Outcome<Plan>> {
        require_admin(actor, "update plans")?;
        if !target_value.is_finite() || target_value <= 0.0 {
            return Err(PmsError::validation("target_value must be greater than zero"));
        }
        let store = self.ctx.store;
        let mut plan = self.load_plan(plan_id)?;
        if plan.status.is_terminal() {
            return Err(PmsError::conflict(format!("plan {plan_id} is {}", plan.status.as_str())));
        }
        let old_value = plan.target_value;
        if (old_value - target_value).abs() < f64::EPSILON {
            return Ok(Outcome::new(plan, Vec::new()));
        }
        plan.target_value = target_value;
        let cascaded = store.with_transaction(|store| {
            store.update_plan_target(plan_id, target_value)?;
            self.cascade(&plan)
        })?;
        let events = vec![
            AuditEvent::PlanTargetChanged {
                plan_id: plan_id.to_string(),
                old_value,
                new_value: target_value,
            },
            cascaded_event(plan_id, &cascaded),
        ];
        Ok(Outcome::new(plan, events))
    }

    pub fn set_plan_status(&self, actor: &Actor, plan_id: &str, status: PlanStatus) -> PmsResult<Outcome<Plan>> {
        require_admin(actor, "change plan status")?;
        let mut plan = self.load_plan(plan_id)?;
        let from = plan.status;
        if !from.can_move_to(status) {
            return Err(PmsError::conflict(format!(
                "plan {plan_id} cannot move from {} to {}",
                from.as_str(),
                status.as_str()
            )));
        }
        self.ctx.store.with_transaction(|store| {
            store.update_plan_status(plan_id, status)?;
            if status == PlanStatus::Cancelled {
                let removed = store.delete_staff_plans_for_plan(plan_id)?;
                log::debug!("cancelled plan {plan_id}: removed {removed} staff plans");
            }
            Ok(())
        })?;
        plan.status = status;
        let event = AuditEvent::PlanStatusChanged {
            plan_id: plan_id.to_string(),
            from: from.as_str().to_string(),
            to: status.as_str().to_string(),
        };
        Ok(Outcome::single(plan, event))
    }

    /// Recompute and replace every StaffPlan of `plan`.
    pub fn cascade(&self, plan: &Plan) -> PmsResult<Vec<StaffPlan>> {
        let config = self.resolve_share_config(&plan.branch_code, plan.kpi_category)?;
        let store = self.ctx.store;
        let roster = store.active_staff_in_branch(&plan.branch_code)?;
        let staff_plans = cascade_targets(plan, &config, &roster)?;
        if staff_plans.is_empty() {
            log::warn!("plan {} produced no staff plans for branch {}", plan.plan_id, plan.branch_code);
        }
        store.with_transaction(|store| {
            store.delete_staff_plans_for_plan(&plan.plan_id)?;
            for sp in &staff_plans {
                store.insert_staff_plan(sp)?;
            }
            Ok(())
        })?;
        log::info!(
            "cascaded plan {} ({} {}) into {} staff plans",
            plan.plan_id,
            plan.kpi_category,
            plan.period,
            staff_plans.len()
        );
        Ok(staff_plans)
    }

    /// Re-run the cascade for an existing plan, e.g. after a roster change.
    pub fn recascade(&self, actor: &Actor, plan_id: &str) -> PmsResult<Outcome<Vec<StaffPlan>>> {
        require_admin(actor, "recascade plans")?;
        let plan = self.load_plan(plan_id)?;
        if plan.status.is_terminal() {
            return Err(PmsError::conflict(format!("plan {plan_id} is {}", plan.status.as_str())));
        }
        let staff_plans = self.cascade(&plan)?;
        let event = cascaded_event(plan_id, &staff_plans);
        Ok(Outcome::single(staff_plans, event))
    }

    pub fn staff_plans_for(&self, staff_id: &str, period: &str) -> PmsResult<Vec<StaffPlan>> {
        let label = Period::parse(period)?.label();
        self.ctx.store.staff_plans_for(staff_id, &label)
    }

    pub fn staff_plans_for_plan(&self, plan_id: &str) -> PmsResult<Vec<StaffPlan>> {
        self.ctx.store.staff_plans_for_plan(plan_id)
    }

    fn load_plan(&self, plan_id: &str) -> PmsResult<Plan> {
        self.ctx
            .store
            .get_plan(plan_id)?
            .ok_or_else(|| PmsError::not_found("plan", plan_id))
    }
}

fn cascaded_event(plan_id: &str, staff_plans: &[StaffPlan]) -> AuditEvent {
    AuditEvent::PlanCascaded {
        plan_id: plan_id.to_string(),
        staff_plans: staff_plans.len(),
        total_assigned: round2(staff_plans.iter().map(|sp| sp.individual_target).sum()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn staff(id: &str, position: Position) -> Staff {
        Staff {
            staff_id: id.into(),
            name: id.into(),
            position,
            branch_code: Some("BR1".into()),
            area_code: Some("AR1".into()),
            active: true,
        }
    }

    fn plan(target: f64, period: &str) -> Plan {
        Plan {
            plan_id: "p1".into(),
            branch_code: "BR1".into(),
            kpi_category: KpiCategory::DepositMobilization,
            period: period.into(),
            target_value: target,
            target_type: TARGET_TYPE_INCREMENTAL.into(),
            status: PlanStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn config(bm: f64, msm: f64, acc: f64, mso: f64) -> ShareConfig {
        ShareConfig {
            config_id: "c1".into(),
            branch_code: None,
            kpi_category: KpiCategory::DepositMobilization,
            branch_manager: bm,
            msm,
            accountant: acc,
            mso,
            total_percent: bm + msm + acc + mso,
            active: true,
        }
    }

    #[test]
    fn mso_pool_is_split_equally() {
        let roster = vec![
            staff("m1", Position::MsoI),
            staff("m2", Position::MsoII),
            staff("m3", Position::MsoIII),
        ];
        let plans = cascade_targets(&plan(9000.0, "2025-H2"), &config(0.0, 0.0, 0.0, 30.0), &roster).unwrap();
        assert_eq!(plans.len(), 3);
        for sp in &plans {
            assert!((sp.individual_target - 900.0).abs() < 1e-9);
            assert!((sp.share_percent - 10.0).abs() < 1e-9);
            assert_eq!(sp.monthly_target, 150.0);
        }
    }

    #[test]
    fn zero_share_and_ineligible_positions_get_nothing() {
        let roster = vec![
            staff("bm", Position::BranchManager),
            staff("acc", Position::Accountant),
            staff("stl", Position::SubTeamLeader),
        ];
        let plans = cascade_targets(&plan(1000.0, "2025"), &config(20.0, 10.0, 0.0, 50.0), &roster).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].staff_id, "bm");
        assert_eq!(plans[0].individual_target, 200.0);
        assert_eq!(plans[0].yearly_target, 200.0);
        assert_eq!(plans[0].weekly_target, 3.85);
    }

    #[test]
    fn breakdowns_follow_period_divisors() {
        let roster = vec![staff("bm", Position::BranchManager)];
        let plans = cascade_targets(&plan(1000.0, "Q4-2025"), &config(100.0, 0.0, 0.0, 0.0), &roster).unwrap();
        let sp = &plans[0];
        assert_eq!(sp.monthly_target, 333.33);
        assert_eq!(sp.weekly_target, 76.92);
        assert_eq!(sp.daily_target, 10.87);
        assert_eq!(sp.yearly_target, 4000.0);
    }
}
