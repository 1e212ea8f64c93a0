//! KPI scoring against cascaded staff targets.

mod common;

use common::*;
use pms_core::{
    approval::Decision,
    category::{KpiCategory, TaskType},
    cbs_extract::BaselineRecord,
    engine::PmsEngine,
    error::PmsError,
    plan_cascade_subsystem::PlanInput,
    task_subsystem::TaskInput,
};

fn plan(engine: &PmsEngine, category: KpiCategory, target: f64) {
    engine
        .create_plan(
            &admin(),
            PlanInput {
                branch_code: BRANCH.into(),
                kpi_category: category,
                period: "2025-H2".into(),
                target_value: target,
                status: None,
            },
        )
        .unwrap();
}

fn baseline(engine: &PmsEngine, period: &str, rows: &[(&str, &str)]) {
    let records: Vec<BaselineRecord> = rows
        .iter()
        .enumerate()
        .map(|(i, (account, balance))| BaselineRecord {
            row: i + 1,
            account_id: account.to_string(),
            june_balance: balance.to_string(),
            account_number: None,
            branch_code: Some(BRANCH.into()),
        })
        .collect();
    engine
        .import_baseline(&admin(), period, date(2025, 6, 30), &records)
        .unwrap();
    engine.activate_baseline_period(&admin(), period).unwrap();
}

#[test]
fn deposit_growth_scenario() {
    let engine = build();
    seed_team(&engine);
    // Three MSOs share 30%: each gets 10% of 100000.
    default_shares(&engine, KpiCategory::DepositMobilization, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::DepositMobilization, 100_000.0);
    owned_account(&engine, "D-1", "mso1", 8000.0, 0.0);
    baseline(&engine, "June-2025", &[("D-1", "3000")]);

    let score = engine.score("mso1", "2025-H2").unwrap();
    let deposit = &score.category_scores[&KpiCategory::DepositMobilization];
    assert_eq!(deposit.target, 10_000.0);
    assert_eq!(deposit.actual, 5000.0);
    assert_eq!(deposit.percent, 50.0);
    assert_eq!(deposit.weight, 25.0);
    assert_eq!(deposit.score, 12.5);
    assert_eq!(score.kpi_total_score, 10.63);
}

#[test]
fn mapping_june_balance_is_the_fallback_baseline() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::DepositMobilization, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::DepositMobilization, 100_000.0);
    owned_account(&engine, "D-1", "mso1", 8000.0, 3000.0);

    let score = engine.score("mso1", "2025-H2").unwrap();
    assert_eq!(score.category_scores[&KpiCategory::DepositMobilization].actual, 5000.0);
}

#[test]
fn shrinking_and_non_qualifying_accounts_add_nothing() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::DepositMobilization, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::DepositMobilization, 100_000.0);
    owned_account(&engine, "SHRINK", "mso1", 1000.0, 0.0);
    owned_account(&engine, "TINY", "mso1", 400.0, 0.0);
    owned_account(&engine, "GROW", "mso1", 2500.0, 0.0);
    baseline(&engine, "June-2025", &[("SHRINK", "4000"), ("TINY", "0"), ("GROW", "500")]);

    let score = engine.score("mso1", "2025-H2").unwrap();
    let deposit = &score.category_scores[&KpiCategory::DepositMobilization];
    assert_eq!(deposit.actual, 2000.0);
    assert_eq!(deposit.percent, 20.0);
}

#[test]
fn only_validated_tasks_count() {
    let engine = build();
    let team = seed_team(&engine);
    default_shares(&engine, KpiCategory::MemberRegistration, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::MemberRegistration, 300.0);

    let day = date(2025, 12, 5);
    for account in ["M-1", "M-2", "M-3", "M-4"] {
        let task = engine
            .submit_task(
                &team.msos[0],
                TaskInput {
                    task_type: TaskType::MemberRegistration,
                    account_number: Some(account.into()),
                    amount: 0.0,
                    task_date: day,
                },
            )
            .unwrap();
        for approver in [&team.accountant, &team.msm, &team.bm] {
            engine.act_on_task(approver, &task.task_id, Decision::Approve, None).unwrap();
        }
    }
    // M-4 never shows up in the core banking extract.
    engine
        .reconcile_csv(
            &admin(),
            BRANCH,
            day,
            "cbs.csv",
            "Account Number,Balance,Transaction Date,Amount\n\
             M-1,100,2025-12-05,0\n\
             M-2,100,2025-12-05,0\n\
             M-3,100,2025-12-05,0\n"
                .as_bytes(),
        )
        .unwrap();

    let score = engine.score("mso1", "2025-H2").unwrap();
    let registration = &score.category_scores[&KpiCategory::MemberRegistration];
    assert_eq!(registration.target, 30.0);
    assert_eq!(registration.actual, 3.0);
    assert_eq!(registration.percent, 10.0);
    assert_eq!(registration.score, 2.0);
    assert_eq!(score.kpi_total_score, 1.7);

    // No plan for the quarter, so nothing to score there.
    let q1 = engine.score("mso1", "2025-Q1");
    assert!(matches!(q1, Err(PmsError::NoPlanFound { .. })));
}

#[test]
fn ineligible_tasks_earn_nothing_even_when_validated() {
    let engine = build();
    let team = seed_team(&engine);
    default_shares(&engine, KpiCategory::LoanNpl, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::LoanNpl, 30_000.0);
    owned_account(&engine, "L-9", "mso2", 5000.0, 0.0);
    owned_account(&engine, "L-SMALL", "mso1", 300.0, 0.0);
    owned_account(&engine, "L-1", "mso1", 5000.0, 0.0);

    let day = date(2025, 12, 5);
    let mut eligibility = Vec::new();
    for (account, amount) in [("L-9", 2000.0), ("L-SMALL", 700.0), ("L-1", 1500.0)] {
        let task = engine
            .submit_task(
                &team.msos[0],
                TaskInput {
                    task_type: TaskType::LoanFollowUp,
                    account_number: Some(account.into()),
                    amount,
                    task_date: day,
                },
            )
            .unwrap();
        eligibility.push(task.kpi_eligible);
        for approver in [&team.accountant, &team.msm, &team.bm] {
            engine.act_on_task(approver, &task.task_id, Decision::Approve, None).unwrap();
        }
    }
    // Someone else's account, then one of mso1's own below the minimum.
    assert_eq!(eligibility, vec![false, false, true]);

    let v = engine
        .reconcile_csv(
            &admin(),
            BRANCH,
            day,
            "cbs.csv",
            "Account Number,Balance,Transaction Date,Amount\n\
             L-9,5000,2025-12-05,2000\n\
             L-SMALL,300,2025-12-05,700\n\
             L-1,5000,2025-12-05,1500\n"
                .as_bytes(),
        )
        .unwrap();
    assert_eq!(v.matched_records, 3);

    let score = engine.score("mso1", "2025-H2").unwrap();
    let loans = &score.category_scores[&KpiCategory::LoanNpl];
    assert_eq!(loans.target, 3000.0);
    assert_eq!(loans.actual, 1500.0);
    assert_eq!(loans.percent, 50.0);
    assert_eq!(loans.score, 5.0);
}

#[test]
fn staff_without_a_plan_get_no_plan_found() {
    let engine = build();
    seed_team(&engine);
    let err = engine.score("stl", "2025-H2").unwrap_err();
    assert!(matches!(err, PmsError::NoPlanFound { .. }));
    assert_eq!(err.to_failure().kind, "no_plan_found");
}

#[test]
fn categories_without_a_plan_are_left_out() {
    let engine = build();
    seed_team(&engine);
    default_shares(&engine, KpiCategory::CustomerBase, 0.0, 0.0, 0.0, 30.0);
    plan(&engine, KpiCategory::CustomerBase, 300.0);

    let score = engine.score("mso2", "2025-H2").unwrap();
    assert_eq!(score.category_scores.len(), 1);
    assert_eq!(score.kpi_total_score, 0.0);
}
