//! Audit events.
//!
//! RULE: Every mutating operation produces exactly one AuditEvent per
//! entity it changes. The engine persists them; the core does not care
//! how they are displayed.

use crate::{
    approval::{ApprovalStatus, Decision},
    category::KpiCategory,
    types::{EntityId, StaffId},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Variants are added per feature, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // ── Roster ─────────────────────────────────────
    BranchSaved {
        branch_code: String,
        area_code: String,
    },
    StaffSaved {
        staff_id: StaffId,
        position: String,
        branch_code: Option<String>,
    },
    StaffDeactivated {
        staff_id: StaffId,
    },

    // ── Baselines ──────────────────────────────────
    BaselineImported {
        period: String,
        inserted: usize,
        updated: usize,
        failed: usize,
    },
    BaselinePeriodActivated {
        period: String,
        deactivated: usize,
    },
    BaselinePeriodDeactivated {
        period: String,
    },

    // ── Account mapping ────────────────────────────
    AccountMapped {
        account_number: String,
        staff_id: StaffId,
        previous_owner: Option<StaffId>,
    },
    AccountTransferred {
        account_number: String,
        from: StaffId,
        to: StaffId,
    },
    AccountAutoMapped {
        account_number: String,
        staff_id: StaffId,
        task_id: EntityId,
    },
    AccountsAutoBalanced {
        branch_code: String,
        assigned: usize,
    },
    ProductMappingSaved {
        product_name: String,
        kpi_category: KpiCategory,
        active: bool,
    },

    // ── Plans ──────────────────────────────────────
    ShareConfigSaved {
        config_id: EntityId,
        branch_code: Option<String>,
        kpi_category: KpiCategory,
        total_percent: f64,
    },
    PlanCreated {
        plan_id: EntityId,
        branch_code: String,
        kpi_category: KpiCategory,
        period: String,
        target_value: f64,
    },
    PlanTargetChanged {
        plan_id: EntityId,
        old_value: f64,
        new_value: f64,
    },
    PlanStatusChanged {
        plan_id: EntityId,
        from: String,
        to: String,
    },
    PlanCascaded {
        plan_id: EntityId,
        staff_plans: usize,
        total_assigned: f64,
    },

    // ── Tasks ──────────────────────────────────────
    TaskSubmitted {
        task_id: EntityId,
        submitter_id: StaffId,
        task_type: String,
        mapping_status: String,
        approvers: usize,
    },
    TaskDecision {
        task_id: EntityId,
        approver_id: StaffId,
        decision: Decision,
        status: ApprovalStatus,
    },

    // ── CBS reconciliation ─────────────────────────
    CbsValidationCompleted {
        validation_id: EntityId,
        branch_code: String,
        validation_date: NaiveDate,
        total_records: usize,
        matched_records: usize,
        discrepancies: usize,
        status: String,
    },
    DiscrepancyResolved {
        discrepancy_id: EntityId,
        account_number: String,
    },

    // ── Evaluations and scores ─────────────────────
    EvaluationSubmitted {
        evaluation_id: EntityId,
        staff_id: StaffId,
        total_score: f64,
        approvers: usize,
    },
    EvaluationDecision {
        evaluation_id: EntityId,
        approver_id: StaffId,
        decision: Decision,
        status: ApprovalStatus,
    },
    PerformanceScoreCalculated {
        score_id: EntityId,
        staff_id: StaffId,
        period: String,
        final_score: f64,
        rating: String,
        locked: bool,
    },
    PerformanceScorePublished {
        score_id: EntityId,
        staff_id: StaffId,
    },
}

impl AuditEvent {
    /// Stable action name, used for the `action` column.
    pub fn action_kind(&self) -> &'static str {
        match self {
            Self::BranchSaved { .. } => "branch_saved",
            Self::StaffSaved { .. } => "staff_saved",
            Self::StaffDeactivated { .. } => "staff_deactivated",
            Self::BaselineImported { .. } => "baseline_imported",
            Self::BaselinePeriodActivated { .. } => "baseline_period_activated",
            Self::BaselinePeriodDeactivated { .. } => "baseline_period_deactivated",
            Self::AccountMapped { .. } => "account_mapped",
            Self::AccountTransferred { .. } => "account_transferred",
            Self::AccountAutoMapped { .. } => "account_auto_mapped",
            Self::AccountsAutoBalanced { .. } => "accounts_auto_balanced",
            Self::ProductMappingSaved { .. } => "product_mapping_saved",
            Self::ShareConfigSaved { .. } => "share_config_saved",
            Self::PlanCreated { .. } => "plan_created",
            Self::PlanTargetChanged { .. } => "plan_target_changed",
            Self::PlanStatusChanged { .. } => "plan_status_changed",
            Self::PlanCascaded { .. } => "plan_cascaded",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::TaskDecision { .. } => "task_decision",
            Self::CbsValidationCompleted { .. } => "cbs_validation_completed",
            Self::DiscrepancyResolved { .. } => "discrepancy_resolved",
            Self::EvaluationSubmitted { .. } => "evaluation_submitted",
            Self::EvaluationDecision { .. } => "evaluation_decision",
            Self::PerformanceScoreCalculated { .. } => "performance_score_calculated",
            Self::PerformanceScorePublished { .. } => "performance_score_published",
        }
    }

    /// (entity type, entity id) the event is about.
    pub fn entity(&self) -> (&'static str, String) {
        match self {
            Self::BranchSaved { branch_code, .. } => ("branch", branch_code.clone()),
            Self::StaffSaved { staff_id, .. } | Self::StaffDeactivated { staff_id } => {
                ("staff", staff_id.clone())
            }
            Self::BaselineImported { period, .. }
            | Self::BaselinePeriodActivated { period, .. }
            | Self::BaselinePeriodDeactivated { period } => ("baseline_period", period.clone()),
            Self::AccountMapped { account_number, .. }
            | Self::AccountTransferred { account_number, .. }
            | Self::AccountAutoMapped { account_number, .. } => {
                ("account_mapping", account_number.clone())
            }
            Self::AccountsAutoBalanced { branch_code, .. } => ("branch", branch_code.clone()),
            Self::ProductMappingSaved { product_name, .. } => {
                ("product_mapping", product_name.clone())
            }
            Self::ShareConfigSaved { config_id, .. } => ("plan_share_config", config_id.clone()),
            Self::PlanCreated { plan_id, .. }
            | Self::PlanTargetChanged { plan_id, .. }
            | Self::PlanStatusChanged { plan_id, .. }
            | Self::PlanCascaded { plan_id, .. } => ("plan", plan_id.clone()),
            Self::TaskSubmitted { task_id, .. } | Self::TaskDecision { task_id, .. } => {
                ("daily_task", task_id.clone())
            }
            Self::CbsValidationCompleted { validation_id, .. } => {
                ("cbs_validation", validation_id.clone())
            }
            Self::DiscrepancyResolved { discrepancy_id, .. } => {
                ("cbs_discrepancy", discrepancy_id.clone())
            }
            Self::EvaluationSubmitted { evaluation_id, .. }
            | Self::EvaluationDecision { evaluation_id, .. } => {
                ("behavioral_evaluation", evaluation_id.clone())
            }
            Self::PerformanceScoreCalculated { score_id, .. }
            | Self::PerformanceScorePublished { score_id, .. } => {
                ("performance_score", score_id.clone())
            }
        }
    }

    /// Human-readable one-liner.
    pub fn detail(&self) -> String {
        match self {
            Self::BranchSaved { branch_code, area_code } => {
                format!("Saved branch {branch_code} in area {area_code}")
            }
            Self::StaffDeactivated { staff_id } => format!("Deactivated staff {staff_id}"),
            Self::StaffSaved { staff_id, position, branch_code } => format!(
                "Saved staff {staff_id} as {position} ({})",
                branch_code.as_deref().unwrap_or("no branch")
            ),
            Self::BaselineImported { period, inserted, updated, failed } => format!(
                "Imported baseline {period}: {inserted} new, {updated} updated, {failed} failed"
            ),
            Self::BaselinePeriodActivated { period, deactivated } => format!(
                "Activated baseline period {period} ({deactivated} rows deactivated)"
            ),
            Self::BaselinePeriodDeactivated { period } => {
                format!("Deactivated baseline period {period}")
            }
            Self::AccountMapped { account_number, staff_id, previous_owner } => match previous_owner {
                Some(prev) => format!("Reassigned account {account_number} from {prev} to {staff_id}"),
                None => format!("Mapped account {account_number} to {staff_id}"),
            },
            Self::AccountTransferred { account_number, from, to } => {
                format!("Transferred account {account_number} from {from} to {to}")
            }
            Self::AccountAutoMapped { account_number, staff_id, task_id } => format!(
                "Auto-mapped account {account_number} to {staff_id} from task {task_id}"
            ),
            Self::AccountsAutoBalanced { branch_code, assigned } => {
                format!("Auto-balanced {assigned} unowned accounts in branch {branch_code}")
            }
            Self::ProductMappingSaved { product_name, kpi_category, active } => format!(
                "Product '{product_name}' mapped to {kpi_category} (active: {active})"
            ),
            Self::ShareConfigSaved { branch_code, kpi_category, total_percent, .. } => format!(
                "Saved {kpi_category} share config for {} totalling {total_percent}%",
                branch_code.as_deref().unwrap_or("all branches")
            ),
            Self::PlanCreated { branch_code, kpi_category, period, target_value, .. } => format!(
                "Created {kpi_category} plan for {branch_code} {period} with target {target_value:.2}"
            ),
            Self::PlanTargetChanged { plan_id, old_value, new_value } => format!(
                "Changed plan {plan_id} target from {old_value:.2} to {new_value:.2}"
            ),
            Self::PlanStatusChanged { plan_id, from, to } => {
                format!("Plan {plan_id} moved from {from} to {to}")
            }
            Self::PlanCascaded { plan_id, staff_plans, total_assigned } => format!(
                "Cascaded plan {plan_id} into {staff_plans} staff plans ({total_assigned:.2} assigned)"
            ),
            Self::TaskSubmitted { task_id, submitter_id, task_type, mapping_status, approvers } => format!(
                "{submitter_id} submitted {task_type} task {task_id} ({mapping_status}, {approvers} approvers)"
            ),
            Self::TaskDecision { task_id, approver_id, decision, status } => format!(
                "{approver_id} chose {decision:?} on task {task_id}; task is now {}",
                status.as_str()
            ),
            Self::CbsValidationCompleted {
                branch_code,
                validation_date,
                total_records,
                matched_records,
                discrepancies,
                status,
                ..
            } => format!(
                "CBS validation for {branch_code} on {validation_date}: {matched_records}/{total_records} matched, {discrepancies} discrepancies ({status})"
            ),
            Self::DiscrepancyResolved { discrepancy_id, account_number } => {
                format!("Resolved discrepancy {discrepancy_id} on account {account_number}")
            }
            Self::EvaluationSubmitted { evaluation_id, staff_id, total_score, approvers } => format!(
                "Submitted evaluation {evaluation_id} for {staff_id}: {total_score:.2}/15 ({approvers} approvers)"
            ),
            Self::EvaluationDecision { evaluation_id, approver_id, decision, status } => format!(
                "{approver_id} chose {decision:?} on evaluation {evaluation_id}; evaluation is now {}",
                status.as_str()
            ),
            Self::PerformanceScoreCalculated { staff_id, period, final_score, rating, locked, .. } => format!(
                "Scored {staff_id} for {period}: {final_score:.2} ({rating}){}",
                if *locked { ", locked" } else { "" }
            ),
            Self::PerformanceScorePublished { score_id, staff_id } => {
                format!("Published score {score_id} for {staff_id}")
            }
        }
    }
}

/// The audit log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub actor_id: StaffId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: String,
    pub payload: String, // JSON-serialized AuditEvent
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(actor_id: &str, event: &AuditEvent, at: DateTime<Utc>) -> serde_json::Result<Self> {
        let (entity_type, entity_id) = event.entity();
        Ok(Self {
            id: None,
            actor_id: actor_id.to_string(),
            action: event.action_kind().to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            detail: event.detail(),
            payload: serde_json::to_string(event)?,
            created_at: at,
        })
    }
}
