//! Daily task submission and the approval state machine.
//!
//! Status is never set directly: it is re-derived from the chain after
//! every decision (`approval::derive_status`). Chain writes carry the
//! revision they were read at, so two approvers acting on the same task
//! cannot both overwrite each other's entry.

use crate::{
    approval::{ApprovalStatus, ApprovalTemplate, Decision},
    category::TaskType,
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{DailyTask, MappingStatus, Staff},
    position::Actor,
    subsystem::{Ctx, Outcome},
    types::new_id,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub task_type: TaskType,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub amount: f64,
    pub task_date: NaiveDate,
}

pub struct TaskSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> TaskSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    fn submitter(&self, actor: &Actor) -> PmsResult<(Staff, String)> {
        let staff = self
            .ctx
            .store
            .get_staff(&actor.staff_id)?
            .filter(|s| s.active)
            .ok_or_else(|| PmsError::unauthorized(&actor.staff_id, "submit tasks"))?;
        let branch = staff
            .branch_code
            .clone()
            .ok_or_else(|| PmsError::unauthorized(&actor.staff_id, "submit tasks without a branch"))?;
        Ok((staff, branch))
    }

    /// Record a task with its mapping classification and approval chain.
    pub fn submit_task(&self, actor: &Actor, input: TaskInput) -> PmsResult<Outcome<DailyTask>> {
        if !input.amount.is_finite() || input.amount < 0.0 {
            return Err(PmsError::validation("amount must be zero or positive"));
        }
        let account_number = input
            .account_number
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        if input.task_type.requires_account() && account_number.is_none() {
            return Err(PmsError::validation(format!(
                "{} tasks need an account number",
                input.task_type.label()
            )));
        }
        let (submitter, branch_code) = self.submitter(actor)?;
        let min_balance = self.ctx.config.mapping.min_qualifying_balance;
        let auto_approve = self.ctx.config.approval.auto_approve_empty_chain;

        let task = self.ctx.store.with_transaction(|store| {
            let (mapping_status, kpi_eligible) = match account_number.as_deref() {
                None => (MappingStatus::Unmapped, true),
                Some(account) => match store.get_account_mapping(account)? {
                    None => (MappingStatus::Unmapped, true),
                    Some(m) if m.staff_id.as_deref() == Some(submitter.staff_id.as_str()) => {
                        (MappingStatus::MappedToYou, m.current_balance >= min_balance)
                    }
                    Some(m) if m.staff_id.is_none() => (MappingStatus::Unmapped, true),
                    Some(_) => (MappingStatus::MappedToAnotherStaff, false),
                },
            };

            let template = ApprovalTemplate::for_task_submitter(submitter.position);
            let chain = template.resolve(|position| {
                Ok(store
                    .first_active_in_branch(&branch_code, position)?
                    .filter(|s| s.staff_id != submitter.staff_id)
                    .map(|s| s.staff_id))
            })?;
            let approval_status = if chain.is_empty() && auto_approve {
                ApprovalStatus::Approved
            } else {
                chain.status()
            };

            let task = DailyTask {
                task_id: new_id(),
                task_type: input.task_type,
                account_number: account_number.clone(),
                amount: input.amount,
                submitter_id: submitter.staff_id.clone(),
                branch_code: branch_code.clone(),
                mapping_status,
                kpi_eligible,
                approval_status,
                approval_chain: chain,
                cbs_validated: false,
                validation_ref: None,
                task_date: input.task_date,
                revision: 0,
                created_at: Utc::now(),
            };
            store.insert_task(&task)?;
            Ok(task)
        })?;

        log::debug!(
            "task {} by {}: {} approvers, {}",
            task.task_id,
            task.submitter_id,
            task.approval_chain.entries.len(),
            task.approval_status.as_str()
        );
        let event = AuditEvent::TaskSubmitted {
            task_id: task.task_id.clone(),
            submitter_id: task.submitter_id.clone(),
            task_type: task.task_type.label().to_string(),
            mapping_status: task.mapping_status.as_str().to_string(),
            approvers: task.approval_chain.entries.len(),
        };
        Ok(Outcome::single(task, event))
    }

    /// Apply one approver's decision to their pending chain entry.
    pub fn act_on_task(
        &self,
        actor: &Actor,
        task_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> PmsResult<Outcome<DailyTask>> {
        let store = self.ctx.store;
        let mut task = store
            .get_task(task_id)?
            .ok_or_else(|| PmsError::not_found("daily_task", task_id))?;
        if task.approval_status.is_terminal() {
            return Err(PmsError::conflict(format!(
                "task {task_id} is already {}",
                task.approval_status.as_str()
            )));
        }
        let status = task
            .approval_chain
            .decide(&actor.staff_id, decision, comment, Utc::now())?;
        if !store.update_task_approval(task_id, task.revision, &task.approval_chain, status)? {
            return Err(PmsError::conflict(format!("task {task_id} was changed by another approver")));
        }
        task.approval_status = status;
        task.revision += 1;

        let event = AuditEvent::TaskDecision {
            task_id: task_id.to_string(),
            approver_id: actor.staff_id.clone(),
            decision,
            status,
        };
        Ok(Outcome::single(task, event))
    }

    /// Pending tasks waiting on `staff_id`'s decision.
    pub fn pending_approvals_for(&self, staff_id: &str) -> PmsResult<Vec<DailyTask>> {
        let store = self.ctx.store;
        let staff = store
            .get_staff(staff_id)?
            .ok_or_else(|| PmsError::not_found("staff", staff_id))?;
        let Some(branch_code) = staff.branch_code else {
            return Ok(Vec::new());
        };
        Ok(store
            .pending_tasks_in_branch(&branch_code)?
            .into_iter()
            .filter(|t| t.approval_chain.has_pending_entry_for(staff_id))
            .collect())
    }

    pub fn get_task(&self, task_id: &str) -> PmsResult<DailyTask> {
        self.ctx
            .store
            .get_task(task_id)?
            .ok_or_else(|| PmsError::not_found("daily_task", task_id))
    }
}
