//! KPI scoring: actual vs target per category, weighted into the KPI block.
//!
//! Percent and score are rounded to two places at every step, and the
//! total is computed from the rounded category scores.

use crate::{
    category::KpiCategory,
    error::{PmsError, PmsResult},
    model::{AccountMapping, CategoryScore},
    period::Period,
    store::PmsStore,
    subsystem::Ctx,
    types::round2,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiScore {
    pub staff_id: String,
    pub period: Period,
    pub category_scores: BTreeMap<KpiCategory, CategoryScore>,
    pub kpi_total_score: f64,
}

/// percent = actual / target × 100, or 0 for a zero target.
pub fn achievement_percent(actual: f64, target: f64) -> f64 {
    if target == 0.0 {
        0.0
    } else {
        round2(actual / target * 100.0)
    }
}

/// Growth over baseline, floored at zero per account.
pub fn deposit_growth(accounts: &[(AccountMapping, f64)]) -> f64 {
    accounts
        .iter()
        .map(|(m, baseline)| (m.current_balance - baseline).max(0.0))
        .sum()
}

pub struct KpiScoringSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> KpiScoringSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    /// Score a staff member for a period. Fails with `NoPlanFound` when the
    /// staff member has no staff plan for it.
    pub fn score(&self, staff_id: &str, period: &Period) -> PmsResult<KpiScore> {
        let store = self.ctx.store;
        let scoring = &self.ctx.config.scoring;
        let label = period.label();

        let plans = store.staff_plans_for(staff_id, &label)?;
        if plans.is_empty() {
            return Err(PmsError::NoPlanFound {
                staff_id: staff_id.to_string(),
                period: label,
            });
        }
        let mut targets: BTreeMap<KpiCategory, f64> = BTreeMap::new();
        for plan in &plans {
            *targets.entry(plan.kpi_category).or_default() += plan.individual_target;
        }

        let mut category_scores = BTreeMap::new();
        for (category, target) in targets {
            let actual = self.actual_for(store, staff_id, category, period)?;
            let percent = achievement_percent(actual, target);
            let weight = scoring.weight(category);
            let score = round2(percent / 100.0 * weight);
            log::debug!("{staff_id} {category}: {actual:.2}/{target:.2} = {percent}% -> {score}");
            category_scores.insert(
                category,
                CategoryScore {
                    target: round2(target),
                    actual: round2(actual),
                    percent,
                    weight,
                    score,
                },
            );
        }

        let weighted: f64 = round2(category_scores.values().map(|c| c.score).sum());
        let kpi_total_score = round2(weighted / 100.0 * scoring.kpi_share);
        Ok(KpiScore {
            staff_id: staff_id.to_string(),
            period: *period,
            category_scores,
            kpi_total_score,
        })
    }

    fn actual_for(
        &self,
        store: &PmsStore,
        staff_id: &str,
        category: KpiCategory,
        period: &Period,
    ) -> PmsResult<f64> {
        let Some(task_type) = category.scoring_task_type() else {
            // Deposit mobilization is balance growth, not task volume.
            let min_balance = self.ctx.config.mapping.min_qualifying_balance;
            let mut accounts = Vec::new();
            for mapping in store.accounts_for_staff(staff_id)? {
                if !mapping.qualifies(min_balance) {
                    continue;
                }
                let baseline = store
                    .active_baseline_for(&mapping.account_number)?
                    .map(|b| b.balance)
                    .unwrap_or(mapping.june_balance);
                accounts.push((mapping, baseline));
            }
            return Ok(deposit_growth(&accounts));
        };

        let tasks = store.validated_tasks_for(staff_id, task_type)?;
        let in_period = tasks.iter().filter(|t| period.contains(t.task_date));
        let actual = if category == KpiCategory::LoanNpl {
            in_period.map(|t| t.amount).sum()
        } else {
            in_period.count() as f64
        };
        Ok(actual)
    }
}
