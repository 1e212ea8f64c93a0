//! Behavioral evaluations and the performance score lock.

mod common;

use common::*;
use pms_core::{
    approval::{ApprovalStatus, Decision},
    behavioral_subsystem::EvaluationInput,
    category::KpiCategory,
    engine::PmsEngine,
    error::PmsError,
    model::{Competency, Rating, ScoreStatus, Staff},
    plan_cascade_subsystem::PlanInput,
    position::{Actor, Position},
};

/// mso1 ends up with a KPI block of 10.63 for 2025-H2.
fn scored_team(engine: &PmsEngine) -> Team {
    let team = seed_team(engine);
    default_shares(engine, KpiCategory::DepositMobilization, 0.0, 0.0, 0.0, 30.0);
    engine
        .create_plan(
            &admin(),
            PlanInput {
                branch_code: BRANCH.into(),
                kpi_category: KpiCategory::DepositMobilization,
                period: "2025-H2".into(),
                target_value: 100_000.0,
                status: None,
            },
        )
        .unwrap();
    owned_account(engine, "D-1", "mso1", 8000.0, 3000.0);
    team
}

fn competency(name: &str, score: f64) -> Competency {
    Competency {
        name: name.into(),
        score,
        max_score: 5.0,
        weight: 1.0,
    }
}

fn evaluation_for(staff_id: &str) -> EvaluationInput {
    EvaluationInput {
        staff_id: staff_id.into(),
        period: "H2-2025".into(),
        competencies: vec![competency("teamwork", 4.0), competency("integrity", 5.0)],
    }
}

#[test]
fn finalize_without_an_evaluation_is_recomputable() {
    let engine = build();
    scored_team(&engine);

    let first = engine.finalize(&admin(), "mso1", "2025-H2").unwrap();
    assert_eq!(first.kpi_total_score, 10.63);
    assert_eq!(first.behavioral_score, 0.0);
    assert_eq!(first.final_score, 10.63);
    assert_eq!(first.rating, Rating::Unsatisfactory);
    assert_eq!(first.status, ScoreStatus::Calculated);
    assert!(!first.is_locked);

    // Balance moves; the unlocked record follows.
    engine
        .store
        .update_mapping_balances("D-1", 13_000.0, 3000.0, Some(date(2025, 12, 1)), true)
        .unwrap();
    let second = engine.finalize(&admin(), "mso1", "2025-H2").unwrap();
    assert_eq!(second.score_id, first.score_id);
    assert_eq!(second.kpi_total_score, 21.25);
    assert_eq!(engine.score_for("mso1", "2025-H2").unwrap().unwrap().final_score, 21.25);
}

#[test]
fn approved_evaluation_locks_the_score() {
    let engine = build();
    let team = scored_team(&engine);

    let evaluation = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();
    assert_eq!(evaluation.total_score, 13.5);
    assert_eq!(evaluation.period, "2025-H2");
    assert_eq!(evaluation.approval_chain.entries.len(), 1);
    assert_eq!(evaluation.approval_chain.entries[0].approver_id, "bm");
    assert_eq!(engine.pending_evaluations_for("bm").unwrap().len(), 1);

    let approved = engine
        .act_on_evaluation(&team.bm, &evaluation.evaluation_id, Decision::Approve, None)
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);

    let score = engine.score_for("mso1", "2025-H2").unwrap().unwrap();
    assert!(score.is_locked);
    assert!(score.locked_at.is_some());
    assert_eq!(score.status, ScoreStatus::Locked);
    assert_eq!(score.behavioral_score, 13.5);
    assert_eq!(score.final_score, 24.13);
    assert_eq!(score.evaluation_id.as_deref(), Some(evaluation.evaluation_id.as_str()));

    // Locked records are never recomputed.
    engine
        .store
        .update_mapping_balances("D-1", 50_000.0, 3000.0, Some(date(2025, 12, 1)), true)
        .unwrap();
    let err = engine.finalize(&admin(), "mso1", "2025-H2").unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));
    assert_eq!(engine.score_for("mso1", "2025-H2").unwrap().unwrap().final_score, 24.13);
}

#[test]
fn publishing_moves_locked_scores_to_finalized() {
    let engine = build();
    let team = scored_team(&engine);

    let unlocked = engine.finalize(&admin(), "mso1", "2025-H2").unwrap();
    let err = engine.publish_score(&admin(), &unlocked.score_id).unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));

    let evaluation = engine.submit_evaluation(&team.msm, evaluation_for("mso1")).unwrap();
    engine
        .act_on_evaluation(&team.bm, &evaluation.evaluation_id, Decision::Approve, None)
        .unwrap();

    let err = engine.publish_score(&team.bm, &unlocked.score_id).unwrap_err();
    assert!(matches!(err, PmsError::Authorization { .. }));

    let published = engine.publish_score(&admin(), &unlocked.score_id).unwrap();
    assert_eq!(published.status, ScoreStatus::Finalized);
    assert_eq!(engine.store.event_count("performance_score_published").unwrap(), 1);
}

#[test]
fn rejected_evaluation_leaves_the_score_open() {
    let engine = build();
    let team = scored_team(&engine);
    let evaluation = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();
    engine
        .act_on_evaluation(&team.bm, &evaluation.evaluation_id, Decision::Reject, Some("redo".into()))
        .unwrap();

    assert!(engine.score_for("mso1", "2025-H2").unwrap().is_none());
    let score = engine.finalize(&admin(), "mso1", "2025-H2").unwrap();
    assert!(!score.is_locked);
    assert_eq!(score.behavioral_score, 0.0);

    // A rejected evaluation can be redone.
    let redo = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();
    assert_eq!(redo.approval_status, ApprovalStatus::Pending);
}

#[test]
fn one_live_evaluation_per_staff_and_period() {
    let engine = build();
    let team = scored_team(&engine);
    let first = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();

    let err = engine.submit_evaluation(&team.msm, evaluation_for("mso1")).unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));

    engine
        .act_on_evaluation(&team.bm, &first.evaluation_id, Decision::Approve, None)
        .unwrap();
    let err = engine.submit_evaluation(&team.msm, evaluation_for("mso1")).unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));

    // Another period is independent.
    let mut q4 = evaluation_for("mso1");
    q4.period = "Q4-2025".into();
    engine.submit_evaluation(&team.msm, q4).unwrap();
}

#[test]
fn late_approval_against_a_locked_score_still_completes() {
    let engine = build();
    let team = scored_team(&engine);
    let first = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();

    // A second pending evaluation written straight to the store.
    let mut older = first.clone();
    older.evaluation_id = "eval-older".into();
    older.evaluator_id = "msm".into();
    engine.store.insert_evaluation(&older).unwrap();

    engine
        .act_on_evaluation(&team.bm, &first.evaluation_id, Decision::Approve, None)
        .unwrap();
    let locked = engine.score_for("mso1", "2025-H2").unwrap().unwrap();
    assert!(locked.is_locked);

    let late = engine
        .act_on_evaluation(&team.bm, "eval-older", Decision::Approve, None)
        .unwrap();
    assert_eq!(late.approval_status, ApprovalStatus::Approved);
    assert_eq!(late.revision, 1);

    let after = engine.score_for("mso1", "2025-H2").unwrap().unwrap();
    assert_eq!(after.final_score, locked.final_score);
    assert_eq!(after.evaluation_id.as_deref(), Some(first.evaluation_id.as_str()));
}

#[test]
fn branch_managers_are_signed_off_by_their_area_manager() {
    let engine = build();
    let team = seed_team(&engine);
    engine
        .upsert_staff(
            &admin(),
            Staff {
                staff_id: "am".into(),
                name: "Area lead".into(),
                position: Position::AreaManager,
                branch_code: None,
                area_code: Some(AREA.into()),
                active: true,
            },
        )
        .unwrap();
    let am = Actor::new("am", Position::AreaManager);

    let evaluation = engine.submit_evaluation(&team.bm, evaluation_for("msm")).unwrap();
    assert_eq!(evaluation.approval_chain.entries[0].approver_id, "am");
    assert_eq!(engine.pending_evaluations_for("am").unwrap().len(), 1);

    // msm has no plan: approval succeeds and the lock waits for a plan.
    let approved = engine
        .act_on_evaluation(&am, &evaluation.evaluation_id, Decision::Approve, None)
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert!(engine.score_for("msm", "2025-H2").unwrap().is_none());
}

#[test]
fn evaluators_are_limited_to_their_branch_and_role() {
    let engine = build();
    let team = scored_team(&engine);
    add_branch(&engine, "BR-002", AREA);
    add_staff(&engine, "far-mso", Position::MsoI, Some("BR-002"));

    let err = engine.submit_evaluation(&team.stl, evaluation_for("far-mso")).unwrap_err();
    assert!(matches!(err, PmsError::Authorization { .. }));

    let err = engine.submit_evaluation(&team.msos[0], evaluation_for("mso2")).unwrap_err();
    assert!(matches!(err, PmsError::Authorization { .. }));

    let mut bad = evaluation_for("mso1");
    bad.competencies[0].score = 6.0;
    let err = engine.submit_evaluation(&team.stl, bad).unwrap_err();
    assert!(matches!(err, PmsError::Validation(_)));
}

#[test]
fn every_mutation_is_written_to_the_event_log() {
    let engine = build();
    let team = scored_team(&engine);
    let evaluation = engine.submit_evaluation(&team.stl, evaluation_for("mso1")).unwrap();
    engine
        .act_on_evaluation(&team.bm, &evaluation.evaluation_id, Decision::Approve, None)
        .unwrap();

    for action in [
        "branch_saved",
        "staff_saved",
        "share_config_saved",
        "plan_created",
        "plan_cascaded",
        "evaluation_submitted",
        "evaluation_decision",
        "performance_score_calculated",
    ] {
        assert!(engine.store.event_count(action).unwrap() > 0, "no {action} event");
    }
    let recent = engine.recent_events(3).unwrap();
    assert_eq!(recent.len(), 3);

    let history = engine.events_for("behavioral_evaluation", &evaluation.evaluation_id).unwrap();
    assert!(history.iter().all(|e| e.actor_id == "stl" || e.actor_id == "bm"));
}
