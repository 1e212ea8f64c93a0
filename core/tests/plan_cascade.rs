//! Plan cascade: branch targets split into staff plans by share config.

mod common;

use common::*;
use pms_core::{
    category::KpiCategory,
    error::PmsError,
    model::PlanStatus,
    plan_cascade_subsystem::{PlanInput, ShareConfigInput},
    position::Position,
};

fn plan_input(category: KpiCategory, period: &str, target: f64) -> PlanInput {
    PlanInput {
        branch_code: BRANCH.into(),
        kpi_category: category,
        period: period.into(),
        target_value: target,
        status: None,
    }
}

#[test]
fn cascade_distributes_exactly_the_configured_shares() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 10.0, 10.0, 10.0, 30.0);

    let plan = engine
        .create_plan(&admin(), plan_input(KpiCategory::MemberRegistration, "2025-H2", 9000.0))
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Active);

    let staff_plans = engine.staff_plans_for_plan(&plan.plan_id).unwrap();
    // BM, MSM, accountant and three MSOs; the sub-team leader gets nothing.
    assert_eq!(staff_plans.len(), 6);
    assert!(staff_plans.iter().all(|sp| sp.position != Position::SubTeamLeader));

    let total: f64 = staff_plans.iter().map(|sp| sp.individual_target).sum();
    assert!((total - 9000.0 * 60.0 / 100.0).abs() < 1e-6);

    for sp in staff_plans.iter().filter(|sp| sp.position.is_mso()) {
        assert!((sp.individual_target - 900.0).abs() < 1e-9);
        assert!((sp.share_percent - 10.0).abs() < 1e-9);
        assert_eq!(sp.monthly_target, 150.0);
    }
}

#[test]
fn recascade_is_idempotent() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::CustomerBase, 15.0, 10.0, 5.0, 40.0);
    let plan = engine
        .create_plan(&admin(), plan_input(KpiCategory::CustomerBase, "Q4-2025", 1000.0))
        .unwrap();

    let first = engine.staff_plans_for_plan(&plan.plan_id).unwrap();
    let again = engine.recascade_plan(&admin(), &plan.plan_id).unwrap();
    let stored = engine.staff_plans_for_plan(&plan.plan_id).unwrap();

    assert_eq!(first, again);
    assert_eq!(first, stored);
}

#[test]
fn roster_change_is_picked_up_by_recascade() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 10.0, 10.0, 10.0, 30.0);
    let plan = engine
        .create_plan(&admin(), plan_input(KpiCategory::MemberRegistration, "2025-H2", 9000.0))
        .unwrap();

    add_staff(&engine, "mso4", Position::MsoI, Some(BRANCH));
    let staff_plans = engine.recascade_plan(&admin(), &plan.plan_id).unwrap();
    let msos: Vec<_> = staff_plans.iter().filter(|sp| sp.position.is_mso()).collect();
    assert_eq!(msos.len(), 4);
    for sp in msos {
        assert!((sp.individual_target - 675.0).abs() < 1e-9);
    }
}

#[test]
fn missing_share_config_rolls_back_the_plan() {
    let engine = build();
    seed_team(&engine);

    let err = engine
        .create_plan(&admin(), plan_input(KpiCategory::LoanNpl, "2025-H2", 5000.0))
        .unwrap_err();
    assert!(matches!(err, PmsError::ConfigurationMissing { .. }), "got {err:?}");
    assert_eq!(engine.store.event_count("plan_created").unwrap(), 0);

    // Nothing was kept, so the same plan can be created once configured.
    default_shares(&engine, KpiCategory::LoanNpl, 10.0, 10.0, 10.0, 30.0);
    engine
        .create_plan(&admin(), plan_input(KpiCategory::LoanNpl, "2025-H2", 5000.0))
        .unwrap();
}

#[test]
fn branch_config_overrides_the_default() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::DepositMobilization, 10.0, 10.0, 10.0, 30.0);
    engine
        .save_share_config(
            &admin(),
            ShareConfigInput {
                branch_code: Some(BRANCH.into()),
                kpi_category: KpiCategory::DepositMobilization,
                branch_manager: 20.0,
                msm: 0.0,
                accountant: 0.0,
                mso: 60.0,
            },
        )
        .unwrap();

    let plan = engine
        .create_plan(&admin(), plan_input(KpiCategory::DepositMobilization, "2025-H2", 3000.0))
        .unwrap();
    let staff_plans = engine.staff_plans_for_plan(&plan.plan_id).unwrap();

    // Zero shares produce no row.
    assert_eq!(staff_plans.len(), 4);
    let bm = staff_plans.iter().find(|sp| sp.staff_id == "bm").unwrap();
    assert!((bm.individual_target - 600.0).abs() < 1e-9);
    let mso = staff_plans.iter().find(|sp| sp.staff_id == "mso1").unwrap();
    assert!((mso.individual_target - 600.0).abs() < 1e-9);
}

#[test]
fn shares_over_one_hundred_are_rejected() {
    let engine = build();
    let err = engine
        .save_share_config(
            &admin(),
            ShareConfigInput {
                branch_code: None,
                kpi_category: KpiCategory::CustomerBase,
                branch_manager: 40.0,
                msm: 30.0,
                accountant: 20.0,
                mso: 20.0,
            },
        )
        .unwrap_err();
    assert!(matches!(err, PmsError::Validation(_)));
}

#[test]
fn target_change_recascades_and_cancel_clears_staff_plans() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 10.0, 10.0, 10.0, 30.0);
    let plan = engine
        .create_plan(&admin(), plan_input(KpiCategory::MemberRegistration, "2025-H2", 9000.0))
        .unwrap();

    engine.update_plan_target(&admin(), &plan.plan_id, 12000.0).unwrap();
    let bm = engine
        .staff_plans_for_plan(&plan.plan_id)
        .unwrap()
        .into_iter()
        .find(|sp| sp.staff_id == "bm")
        .unwrap();
    assert!((bm.individual_target - 1200.0).abs() < 1e-9);

    engine
        .set_plan_status(&admin(), &plan.plan_id, PlanStatus::Cancelled)
        .unwrap();
    assert!(engine.staff_plans_for_plan(&plan.plan_id).unwrap().is_empty());

    let err = engine
        .update_plan_target(&admin(), &plan.plan_id, 1.0)
        .unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));
}

#[test]
fn duplicate_open_plan_conflicts() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 10.0, 10.0, 10.0, 30.0);
    engine
        .create_plan(&admin(), plan_input(KpiCategory::MemberRegistration, "2025-H2", 100.0))
        .unwrap();
    let err = engine
        .create_plan(&admin(), plan_input(KpiCategory::MemberRegistration, "H2-2025", 200.0))
        .unwrap_err();
    assert!(matches!(err, PmsError::Conflict(_)));
}

#[test]
fn only_administrators_create_plans() {
    let engine = build();
    let team = seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 10.0, 10.0, 10.0, 30.0);
    let err = engine
        .create_plan(&team.bm, plan_input(KpiCategory::MemberRegistration, "2025-H2", 100.0))
        .unwrap_err();
    assert!(matches!(err, PmsError::Authorization { .. }));
}
