//! Performance aggregation: KPI block plus behavioral score, with the
//! lock that freezes a record once its evaluation is approved.

use crate::{
    error::{PmsError, PmsResult},
    event::AuditEvent,
    kpi_scoring_subsystem::KpiScoringSubsystem,
    model::{PerformanceScore, Rating, ScoreStatus},
    period::Period,
    position::Actor,
    subsystem::{require_admin, Ctx, Outcome},
    types::{new_id, round2},
};
use chrono::Utc;

pub struct PerformanceSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> PerformanceSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    /// Compute and upsert the score for (staff, period). Locked records are
    /// never recomputed.
    pub fn finalize(&self, staff_id: &str, period: &Period) -> PmsResult<Outcome<PerformanceScore>> {
        let store = self.ctx.store;
        let scoring = &self.ctx.config.scoring;
        let staff = store
            .get_staff(staff_id)?
            .ok_or_else(|| PmsError::not_found("staff", staff_id))?;
        let existing = store.get_score(staff_id, period)?;
        if let Some(score) = existing.as_ref().filter(|s| s.is_locked) {
            return Err(PmsError::conflict(format!(
                "score {} for {staff_id} {period} is locked",
                score.score_id
            )));
        }

        let kpi = KpiScoringSubsystem::new(self.ctx).score(staff_id, period)?;
        let evaluation = store.approved_evaluation_for(staff_id, &period.label())?;
        let behavioral_score = evaluation
            .as_ref()
            .map(|e| e.total_score.clamp(0.0, scoring.behavioral_share))
            .unwrap_or(0.0);
        let final_score = round2(kpi.kpi_total_score + behavioral_score);
        let rating = Rating::from_score(final_score, &scoring.rating_thresholds);
        let now = Utc::now();
        let locked = evaluation.is_some();

        let score = PerformanceScore {
            score_id: existing.map(|s| s.score_id).unwrap_or_else(new_id),
            staff_id: staff_id.to_string(),
            branch_code: staff.branch_code.unwrap_or_default(),
            period: *period,
            kpi_scores: kpi.category_scores,
            kpi_total_score: kpi.kpi_total_score,
            behavioral_score,
            evaluation_id: evaluation.map(|e| e.evaluation_id),
            final_score,
            rating,
            status: if locked { ScoreStatus::Locked } else { ScoreStatus::Calculated },
            is_locked: locked,
            locked_at: locked.then_some(now),
            updated_at: now,
        };
        if !store.upsert_score(&score)? {
            return Err(PmsError::conflict(format!("score for {staff_id} {period} was locked concurrently")));
        }
        log::info!(
            "scored {staff_id} for {period}: kpi {} + behavioral {} = {} ({}){}",
            score.kpi_total_score,
            score.behavioral_score,
            score.final_score,
            score.rating.as_str(),
            if locked { ", locked" } else { "" }
        );

        let event = AuditEvent::PerformanceScoreCalculated {
            score_id: score.score_id.clone(),
            staff_id: staff_id.to_string(),
            period: period.label(),
            final_score,
            rating: rating.as_str().to_string(),
            locked,
        };
        Ok(Outcome::single(score, event))
    }

    /// Locked → Finalized. Administrators only.
    pub fn publish_score(&self, actor: &Actor, score_id: &str) -> PmsResult<Outcome<PerformanceScore>> {
        require_admin(actor, "publish performance scores")?;
        let store = self.ctx.store;
        let mut score = store
            .get_score_by_id(score_id)?
            .ok_or_else(|| PmsError::not_found("performance_score", score_id))?;
        if score.status != ScoreStatus::Locked {
            return Err(PmsError::conflict(format!(
                "score {score_id} is {}, only locked scores can be published",
                score.status.as_str()
            )));
        }
        let now = Utc::now();
        store.set_score_status(score_id, ScoreStatus::Finalized, now)?;
        score.status = ScoreStatus::Finalized;
        score.updated_at = now;
        let event = AuditEvent::PerformanceScorePublished {
            score_id: score_id.to_string(),
            staff_id: score.staff_id.clone(),
        };
        Ok(Outcome::single(score, event))
    }

    pub fn score_for(&self, staff_id: &str, period: &Period) -> PmsResult<Option<PerformanceScore>> {
        self.ctx.store.get_score(staff_id, period)
    }
}
