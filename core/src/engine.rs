//! The engine: the single entry point callers drive the core through.
//!
//! RULES:
//!   - Every mutating operation takes the acting staff member.
//!   - Subsystems return their audit events; the engine persists them,
//!     one event_log row per event, stamped with the actor and UTC time.
//!   - Read-only queries go straight to the subsystem and log nothing.

use crate::{
    approval::Decision,
    baseline_subsystem::{BaselineSubsystem, ImportReport},
    behavioral_subsystem::{BehavioralSubsystem, EvaluationInput},
    category::KpiCategory,
    cbs_extract::{read_baseline_records, read_cbs_extract, BaselineFile, BaselineRecord, CbsExtract},
    cbs_reconciliation_subsystem::CbsReconciliationSubsystem,
    config::PmsConfig,
    error::{PmsError, PmsResult},
    event::{AuditEvent, EventLogEntry},
    kpi_scoring_subsystem::{KpiScore, KpiScoringSubsystem},
    mapping_subsystem::MappingSubsystem,
    model::{
        AccountMapping, BaselineBalance, BaselinePeriodSummary, BehavioralEvaluation, Branch,
        CbsDiscrepancy, CbsValidation, DailyTask, PerformanceScore, Plan, PlanStatus, ProductMapping,
        ShareConfig, Staff, StaffPlan,
    },
    performance_subsystem::PerformanceSubsystem,
    period::Period,
    plan_cascade_subsystem::{PlanCascadeSubsystem, PlanInput, ShareConfigInput},
    position::{Actor, Position},
    roster_subsystem::RosterSubsystem,
    store::PmsStore,
    subsystem::{Ctx, Outcome},
    task_subsystem::{TaskInput, TaskSubsystem},
};
use chrono::{NaiveDate, Utc};
use std::io::Read;

pub struct PmsEngine {
    pub store: PmsStore,
    pub config: PmsConfig,
}

impl PmsEngine {
    pub fn build(store: PmsStore, config: PmsConfig) -> Self {
        Self { store, config }
    }

    /// In-memory store, migrations applied, default configuration.
    pub fn build_test() -> PmsResult<Self> {
        let store = PmsStore::in_memory()?;
        store.migrate()?;
        Ok(Self::build(store, PmsConfig::default_test()))
    }

    fn ctx(&self) -> Ctx<'_> {
        Ctx::new(&self.store, &self.config)
    }

    /// Persist an outcome's events and hand back its value.
    fn record<T>(&self, actor: &Actor, outcome: Outcome<T>) -> PmsResult<T> {
        let now = Utc::now();
        for event in &outcome.events {
            let entry = EventLogEntry::new(&actor.staff_id, event, now)?;
            self.store.append_event(&entry)?;
            log::debug!("[{}] {}", entry.action, entry.detail);
        }
        Ok(outcome.value)
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> PmsResult<Vec<EventLogEntry>> {
        self.store.events_for_entity(entity_type, entity_id)
    }

    /// Decoded payloads of the most recent `limit` events, newest first.
    pub fn recent_events(&self, limit: usize) -> PmsResult<Vec<AuditEvent>> {
        self.store
            .recent_events(limit)?
            .iter()
            .map(|e| serde_json::from_str(&e.payload).map_err(PmsError::from))
            .collect()
    }

    // ── Roster ────────────────────────────────────────────────────

    pub fn upsert_branch(&self, actor: &Actor, branch: Branch) -> PmsResult<Branch> {
        let outcome = RosterSubsystem::new(self.ctx()).upsert_branch(actor, branch)?;
        self.record(actor, outcome)
    }

    pub fn upsert_staff(&self, actor: &Actor, staff: Staff) -> PmsResult<Staff> {
        let outcome = RosterSubsystem::new(self.ctx()).upsert_staff(actor, staff)?;
        self.record(actor, outcome)
    }

    pub fn deactivate_staff(&self, actor: &Actor, staff_id: &str) -> PmsResult<()> {
        let outcome = RosterSubsystem::new(self.ctx()).deactivate_staff(actor, staff_id)?;
        self.record(actor, outcome)
    }

    pub fn active_staff_in_branch(&self, branch_code: &str, positions: &[Position]) -> PmsResult<Vec<Staff>> {
        RosterSubsystem::new(self.ctx()).active_staff_in_branch(branch_code, positions)
    }

    pub fn area_manager_for_branch(&self, branch_code: &str) -> PmsResult<Option<Staff>> {
        RosterSubsystem::new(self.ctx()).area_manager_for_branch(branch_code)
    }

    // ── Baselines ─────────────────────────────────────────────────

    pub fn import_baseline(
        &self,
        actor: &Actor,
        period: &str,
        baseline_date: NaiveDate,
        records: &[BaselineRecord],
    ) -> PmsResult<ImportReport> {
        let outcome =
            BaselineSubsystem::new(self.ctx()).import_baseline(actor, period, baseline_date, records, Vec::new())?;
        self.record(actor, outcome)
    }

    pub fn import_baseline_csv<R: Read>(
        &self,
        actor: &Actor,
        period: &str,
        baseline_date: NaiveDate,
        reader: R,
    ) -> PmsResult<ImportReport> {
        let BaselineFile { records, errors } = read_baseline_records(reader)?;
        let outcome =
            BaselineSubsystem::new(self.ctx()).import_baseline(actor, period, baseline_date, &records, errors)?;
        self.record(actor, outcome)
    }

    pub fn activate_baseline_period(&self, actor: &Actor, period: &str) -> PmsResult<usize> {
        let outcome = BaselineSubsystem::new(self.ctx()).activate_period(actor, period)?;
        self.record(actor, outcome)
    }

    pub fn deactivate_baseline_period(&self, actor: &Actor, period: &str) -> PmsResult<usize> {
        let outcome = BaselineSubsystem::new(self.ctx()).deactivate_period(actor, period)?;
        self.record(actor, outcome)
    }

    pub fn active_baseline_for(&self, account: &str) -> PmsResult<Option<BaselineBalance>> {
        BaselineSubsystem::new(self.ctx()).active_baseline_for(account)
    }

    pub fn list_baseline_periods(&self) -> PmsResult<Vec<BaselinePeriodSummary>> {
        BaselineSubsystem::new(self.ctx()).list_periods()
    }

    // ── Account mapping ───────────────────────────────────────────

    pub fn map_account(
        &self,
        actor: &Actor,
        account_number: &str,
        staff_id: &str,
        expected_owner: Option<&str>,
    ) -> PmsResult<AccountMapping> {
        let outcome =
            MappingSubsystem::new(self.ctx()).map_account(actor, account_number, staff_id, expected_owner)?;
        self.record(actor, outcome)
    }

    pub fn transfer_account(&self, actor: &Actor, account_number: &str, new_owner: &str) -> PmsResult<AccountMapping> {
        let outcome = MappingSubsystem::new(self.ctx()).transfer_account(actor, account_number, new_owner)?;
        self.record(actor, outcome)
    }

    pub fn auto_balance(&self, actor: &Actor, branch_code: &str) -> PmsResult<usize> {
        let outcome = MappingSubsystem::new(self.ctx()).auto_balance(actor, branch_code)?;
        self.record(actor, outcome)
    }

    pub fn accounts_for_staff(&self, staff_id: &str) -> PmsResult<Vec<AccountMapping>> {
        MappingSubsystem::new(self.ctx()).accounts_for_staff(staff_id)
    }

    pub fn qualifying_accounts_for_staff(&self, staff_id: &str) -> PmsResult<Vec<AccountMapping>> {
        MappingSubsystem::new(self.ctx()).qualifying_accounts_for_staff(staff_id)
    }

    pub fn upsert_product_mapping(
        &self,
        actor: &Actor,
        product_name: &str,
        kpi_category: KpiCategory,
        active: bool,
    ) -> PmsResult<ProductMapping> {
        let outcome =
            MappingSubsystem::new(self.ctx()).upsert_product_mapping(actor, product_name, kpi_category, active)?;
        self.record(actor, outcome)
    }

    pub fn active_product_mappings(&self) -> PmsResult<Vec<ProductMapping>> {
        MappingSubsystem::new(self.ctx()).active_product_mappings()
    }

    // ── Plans ─────────────────────────────────────────────────────

    pub fn save_share_config(&self, actor: &Actor, input: ShareConfigInput) -> PmsResult<ShareConfig> {
        let outcome = PlanCascadeSubsystem::new(self.ctx()).save_share_config(actor, input)?;
        self.record(actor, outcome)
    }

    pub fn create_plan(&self, actor: &Actor, input: PlanInput) -> PmsResult<Plan> {
        let outcome = PlanCascadeSubsystem::new(self.ctx()).create_plan(actor, input)?;
        self.record(actor, outcome)
    }

    pub fn update_plan_target(&self, actor: &Actor, plan_id: &str, target_value: f64) -> PmsResult<Plan> {
        let outcome = PlanCascadeSubsystem::new(self.ctx()).update_plan_target(actor, plan_id, target_value)?;
        self.record(actor, outcome)
    }

    pub fn set_plan_status(&self, actor: &Actor, plan_id: &str, status: PlanStatus) -> PmsResult<Plan> {
        let outcome = PlanCascadeSubsystem::new(self.ctx()).set_plan_status(actor, plan_id, status)?;
        self.record(actor, outcome)
    }

    pub fn recascade_plan(&self, actor: &Actor, plan_id: &str) -> PmsResult<Vec<StaffPlan>> {
        let outcome = PlanCascadeSubsystem::new(self.ctx()).recascade(actor, plan_id)?;
        self.record(actor, outcome)
    }

    pub fn staff_plans_for(&self, staff_id: &str, period: &str) -> PmsResult<Vec<StaffPlan>> {
        PlanCascadeSubsystem::new(self.ctx()).staff_plans_for(staff_id, period)
    }

    pub fn staff_plans_for_plan(&self, plan_id: &str) -> PmsResult<Vec<StaffPlan>> {
        PlanCascadeSubsystem::new(self.ctx()).staff_plans_for_plan(plan_id)
    }

    // ── Tasks ─────────────────────────────────────────────────────

    pub fn submit_task(&self, actor: &Actor, input: TaskInput) -> PmsResult<DailyTask> {
        let outcome = TaskSubsystem::new(self.ctx()).submit_task(actor, input)?;
        self.record(actor, outcome)
    }

    pub fn act_on_task(
        &self,
        actor: &Actor,
        task_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> PmsResult<DailyTask> {
        let outcome = TaskSubsystem::new(self.ctx()).act_on_task(actor, task_id, decision, comment)?;
        self.record(actor, outcome)
    }

    pub fn pending_approvals_for(&self, staff_id: &str) -> PmsResult<Vec<DailyTask>> {
        TaskSubsystem::new(self.ctx()).pending_approvals_for(staff_id)
    }

    pub fn get_task(&self, task_id: &str) -> PmsResult<DailyTask> {
        TaskSubsystem::new(self.ctx()).get_task(task_id)
    }

    // ── CBS reconciliation ────────────────────────────────────────

    pub fn reconcile(
        &self,
        actor: &Actor,
        branch_code: &str,
        validation_date: NaiveDate,
        file_name: &str,
        extract: CbsExtract,
    ) -> PmsResult<CbsValidation> {
        let outcome = CbsReconciliationSubsystem::new(self.ctx()).reconcile(
            actor,
            branch_code,
            validation_date,
            file_name,
            extract,
        )?;
        self.record(actor, outcome)
    }

    pub fn reconcile_csv<R: Read>(
        &self,
        actor: &Actor,
        branch_code: &str,
        validation_date: NaiveDate,
        file_name: &str,
        reader: R,
    ) -> PmsResult<CbsValidation> {
        let extract = read_cbs_extract(reader)?;
        self.reconcile(actor, branch_code, validation_date, file_name, extract)
    }

    pub fn resolve_discrepancy(&self, actor: &Actor, discrepancy_id: &str, note: &str) -> PmsResult<CbsDiscrepancy> {
        let outcome = CbsReconciliationSubsystem::new(self.ctx()).resolve_discrepancy(actor, discrepancy_id, note)?;
        self.record(actor, outcome)
    }

    pub fn validation_summary(&self, validation_id: &str) -> PmsResult<CbsValidation> {
        CbsReconciliationSubsystem::new(self.ctx()).validation_summary(validation_id)
    }

    // ── Scoring ───────────────────────────────────────────────────

    /// KPI block only; nothing is persisted.
    pub fn score(&self, staff_id: &str, period: &str) -> PmsResult<KpiScore> {
        let period = Period::parse(period)?;
        KpiScoringSubsystem::new(self.ctx()).score(staff_id, &period)
    }

    pub fn submit_evaluation(&self, actor: &Actor, input: EvaluationInput) -> PmsResult<BehavioralEvaluation> {
        let outcome = BehavioralSubsystem::new(self.ctx()).submit_evaluation(actor, input)?;
        self.record(actor, outcome)
    }

    pub fn act_on_evaluation(
        &self,
        actor: &Actor,
        evaluation_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> PmsResult<BehavioralEvaluation> {
        let outcome =
            BehavioralSubsystem::new(self.ctx()).act_on_evaluation(actor, evaluation_id, decision, comment)?;
        self.record(actor, outcome)
    }

    pub fn pending_evaluations_for(&self, staff_id: &str) -> PmsResult<Vec<BehavioralEvaluation>> {
        BehavioralSubsystem::new(self.ctx()).pending_evaluations_for(staff_id)
    }

    pub fn finalize(&self, actor: &Actor, staff_id: &str, period: &str) -> PmsResult<PerformanceScore> {
        let period = Period::parse(period)?;
        let outcome = PerformanceSubsystem::new(self.ctx()).finalize(staff_id, &period)?;
        self.record(actor, outcome)
    }

    pub fn publish_score(&self, actor: &Actor, score_id: &str) -> PmsResult<PerformanceScore> {
        let outcome = PerformanceSubsystem::new(self.ctx()).publish_score(actor, score_id)?;
        self.record(actor, outcome)
    }

    pub fn score_for(&self, staff_id: &str, period: &str) -> PmsResult<Option<PerformanceScore>> {
        let period = Period::parse(period)?;
        PerformanceSubsystem::new(self.ctx()).score_for(staff_id, &period)
    }
}
