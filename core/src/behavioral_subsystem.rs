//! Behavioral evaluations and their sign-off chains.
//!
//! Sub-team leaders and MSMs are signed off by their branch manager;
//! branch managers by their area manager. Approval reuses the task chain
//! logic, and an approved evaluation locks the staff member's score.

use crate::{
    approval::{ApprovalStatus, ApprovalTemplate, Decision},
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{BehavioralEvaluation, Competency},
    performance_subsystem::PerformanceSubsystem,
    period::Period,
    position::{Actor, Position},
    subsystem::{Ctx, Outcome},
    types::{new_id, round2},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub staff_id: String,
    pub period: String,
    pub competencies: Vec<Competency>,
}

/// Weighted competency average scaled to `scale` points.
pub fn behavioral_total(competencies: &[Competency], scale: f64) -> PmsResult<f64> {
    if competencies.is_empty() {
        return Err(PmsError::validation("at least one competency is required"));
    }
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for c in competencies {
        if !(c.max_score > 0.0) || !(c.weight > 0.0) {
            return Err(PmsError::validation(format!(
                "competency '{}' needs a positive max_score and weight",
                c.name
            )));
        }
        if !(0.0..=c.max_score).contains(&c.score) {
            return Err(PmsError::validation(format!(
                "competency '{}' score {} is outside 0..={}",
                c.name, c.score, c.max_score
            )));
        }
        weighted += c.score / c.max_score * c.weight;
        weights += c.weight;
    }
    Ok(round2(weighted / weights * scale))
}

pub struct BehavioralSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> BehavioralSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    pub fn submit_evaluation(&self, actor: &Actor, input: EvaluationInput) -> PmsResult<Outcome<BehavioralEvaluation>> {
        let store = self.ctx.store;
        let evaluator = store
            .get_staff(&actor.staff_id)?
            .filter(|s| s.active)
            .ok_or_else(|| PmsError::unauthorized(&actor.staff_id, "submit evaluations"))?;
        let template = ApprovalTemplate::for_evaluator(evaluator.position);
        if template == ApprovalTemplate::None {
            return Err(PmsError::unauthorized(&actor.staff_id, "submit evaluations"));
        }
        let branch_code = evaluator
            .branch_code
            .clone()
            .ok_or_else(|| PmsError::unauthorized(&actor.staff_id, "submit evaluations without a branch"))?;
        let subject = store
            .get_staff(&input.staff_id)?
            .filter(|s| s.active)
            .ok_or_else(|| PmsError::not_found("staff", &input.staff_id))?;
        if subject.staff_id == evaluator.staff_id {
            return Err(PmsError::validation("staff cannot evaluate themselves"));
        }
        if subject.branch_code.as_deref() != Some(branch_code.as_str()) {
            return Err(PmsError::unauthorized(
                &actor.staff_id,
                format!("evaluate staff outside branch {branch_code}"),
            ));
        }
        let period = Period::parse(&input.period)?;
        let total_score = behavioral_total(&input.competencies, self.ctx.config.scoring.behavioral_share)?;

        let area_code = match evaluator.area_code.clone() {
            Some(area) => Some(area),
            None => store.get_branch(&branch_code)?.map(|b| b.area_code),
        };
        let chain = template.resolve(|position| {
            let holder = match position {
                Position::AreaManager => match area_code.as_deref() {
                    Some(area) => store.first_active_in_area(area, position)?,
                    None => None,
                },
                _ => store.first_active_in_branch(&branch_code, position)?,
            };
            Ok(holder.filter(|s| s.staff_id != evaluator.staff_id).map(|s| s.staff_id))
        })?;
        if chain.is_empty() {
            return Err(PmsError::validation(format!(
                "no active approver available for evaluations by {}",
                evaluator.position
            )));
        }

        let evaluation = BehavioralEvaluation {
            evaluation_id: new_id(),
            staff_id: subject.staff_id,
            evaluator_id: evaluator.staff_id,
            branch_code,
            period: period.label(),
            competencies: input.competencies,
            total_score,
            approval_status: chain.status(),
            approval_chain: chain,
            revision: 0,
            created_at: Utc::now(),
        };
        // One live evaluation per staff member and period; a rejected one
        // can be redone.
        store.with_transaction(|store| {
            if let Some(open) = store.live_evaluation_for(&evaluation.staff_id, &evaluation.period)? {
                return Err(PmsError::conflict(format!(
                    "{} already has a {} evaluation for {} ({})",
                    evaluation.staff_id,
                    open.approval_status.as_str(),
                    evaluation.period,
                    open.evaluation_id
                )));
            }
            store.insert_evaluation(&evaluation)
        })?;

        let event = AuditEvent::EvaluationSubmitted {
            evaluation_id: evaluation.evaluation_id.clone(),
            staff_id: evaluation.staff_id.clone(),
            total_score,
            approvers: evaluation.approval_chain.entries.len(),
        };
        Ok(Outcome::single(evaluation, event))
    }

    /// Record a decision. When the chain completes Approved, the staff
    /// member's score is recomputed and locked in the same transaction; if
    /// there is no plan yet the lock waits for the next finalize.
    pub fn act_on_evaluation(
        &self,
        actor: &Actor,
        evaluation_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> PmsResult<Outcome<BehavioralEvaluation>> {
        let store = self.ctx.store;
        store.with_transaction(|store| {
            let mut evaluation = store
                .get_evaluation(evaluation_id)?
                .ok_or_else(|| PmsError::not_found("behavioral_evaluation", evaluation_id))?;
            if evaluation.approval_status.is_terminal() {
                return Err(PmsError::conflict(format!(
                    "evaluation {evaluation_id} is already {}",
                    evaluation.approval_status.as_str()
                )));
            }
            let status = evaluation
                .approval_chain
                .decide(&actor.staff_id, decision, comment, Utc::now())?;
            if !store.update_evaluation_approval(evaluation_id, evaluation.revision, &evaluation.approval_chain, status)? {
                return Err(PmsError::conflict(format!(
                    "evaluation {evaluation_id} was changed by another approver"
                )));
            }
            evaluation.approval_status = status;
            evaluation.revision += 1;

            let mut events = vec![AuditEvent::EvaluationDecision {
                evaluation_id: evaluation_id.to_string(),
                approver_id: actor.staff_id.clone(),
                decision,
                status,
            }];
            if status == ApprovalStatus::Approved {
                let period = Period::parse(&evaluation.period)?;
                if store.get_score(&evaluation.staff_id, &period)?.is_some_and(|s| s.is_locked) {
                    log::warn!(
                        "evaluation {evaluation_id} approved but the {period} score for {} is already locked",
                        evaluation.staff_id
                    );
                    return Ok(Outcome::new(evaluation, events));
                }
                match PerformanceSubsystem::new(self.ctx).finalize(&evaluation.staff_id, &period) {
                    Ok(outcome) => events.extend(outcome.events),
                    Err(PmsError::NoPlanFound { .. }) => log::warn!(
                        "evaluation {evaluation_id} approved but {} has no plan for {period}; lock deferred",
                        evaluation.staff_id
                    ),
                    Err(err) => return Err(err),
                }
            }
            Ok(Outcome::new(evaluation, events))
        })
    }

    pub fn pending_evaluations_for(&self, staff_id: &str) -> PmsResult<Vec<BehavioralEvaluation>> {
        let store = self.ctx.store;
        let staff = store
            .get_staff(staff_id)?
            .ok_or_else(|| PmsError::not_found("staff", staff_id))?;
        let mut branches = Vec::new();
        match (staff.position, staff.branch_code) {
            (Position::AreaManager, _) => {
                // Area managers sign off branch managers anywhere in their area;
                // the chain itself filters to the right approver.
                if let Some(area) = staff.area_code.as_deref() {
                    branches = store.branches_in_area(area)?;
                }
            }
            (_, Some(branch)) => branches.push(branch),
            (_, None) => {}
        }
        let mut pending = Vec::new();
        for branch in branches {
            pending.extend(
                store
                    .pending_evaluations_in_branch(&branch)?
                    .into_iter()
                    .filter(|e| e.approval_chain.has_pending_entry_for(staff_id)),
            );
        }
        Ok(pending)
    }
}
