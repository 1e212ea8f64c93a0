//! Baseline balance import and the single-active-period rule.

mod common;

use common::*;
use pms_core::error::PmsError;

const JUNE: &str = "account_id,june_balance,account_number,branch_code\n\
                    1001,\"3,000.00\",ACC-1001,BR-001\n\
                    1002,1500,,BR-001\n\
                    1003,-20,,BR-001\n\
                    1004,n/a,,BR-001\n";

#[test]
fn import_reports_bad_rows_without_failing() {
    let engine = build();
    add_branch(&engine, BRANCH, AREA);

    let report = engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(report.failed, 2);
    let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![3, 4]);

    // Re-import updates in place.
    let again = engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 2);
}

#[test]
fn rows_with_bad_encoding_are_reported_in_order() {
    let engine = build();
    add_branch(&engine, BRANCH, AREA);
    let mut data = JUNE.as_bytes().to_vec();
    data.extend_from_slice(b"10");
    data.push(0xff);
    data.extend_from_slice(b"5,900,,BR-001\n1006,700,,BR-001\n");

    let report = engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), data.as_slice())
        .unwrap();
    assert_eq!(report.inserted, 3);
    assert_eq!(report.failed, 3);
    let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
    assert_eq!(rows, vec![3, 4, 5]);
    assert!(report.errors[2].message.contains("UTF-8"));
}

#[test]
fn activation_leaves_exactly_one_active_period() {
    let engine = build();
    add_branch(&engine, BRANCH, AREA);
    engine
        .import_baseline_csv(&admin(), "June-2024", date(2024, 6, 30), JUNE.as_bytes())
        .unwrap();
    engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap();

    engine.activate_baseline_period(&admin(), "June-2024").unwrap();
    engine.activate_baseline_period(&admin(), "June-2025").unwrap();

    let active: Vec<String> = engine
        .list_baseline_periods()
        .unwrap()
        .into_iter()
        .filter(|p| p.is_active)
        .map(|p| p.period)
        .collect();
    assert_eq!(active, vec!["June-2025".to_string()]);

    let by_id = engine.active_baseline_for("1001").unwrap().unwrap();
    assert_eq!(by_id.balance, 3000.0);
    assert_eq!(by_id.period, "June-2025");
    let by_number = engine.active_baseline_for("ACC-1001").unwrap().unwrap();
    assert_eq!(by_number.account_id, "1001");
}

#[test]
fn rows_imported_into_the_active_period_are_active() {
    let engine = build();
    add_branch(&engine, BRANCH, AREA);
    engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap();
    engine.activate_baseline_period(&admin(), "June-2025").unwrap();

    engine
        .import_baseline_csv(
            &admin(),
            "June-2025",
            date(2025, 6, 30),
            "account_id,june_balance\n2001,700\n".as_bytes(),
        )
        .unwrap();
    assert!(engine.active_baseline_for("2001").unwrap().is_some());
}

#[test]
fn unknown_period_cannot_be_activated() {
    let engine = build();
    let err = engine.activate_baseline_period(&admin(), "June-1999").unwrap_err();
    assert!(matches!(err, PmsError::NotFound { .. }));
}

#[test]
fn deactivation_leaves_no_active_baseline() {
    let engine = build();
    add_branch(&engine, BRANCH, AREA);
    engine
        .import_baseline_csv(&admin(), "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap();
    engine.activate_baseline_period(&admin(), "June-2025").unwrap();
    engine.deactivate_baseline_period(&admin(), "June-2025").unwrap();
    assert!(engine.active_baseline_for("1001").unwrap().is_none());
}

#[test]
fn only_administrators_import() {
    let engine = build();
    let team = seed_team(&engine);
    let err = engine
        .import_baseline_csv(&team.bm, "June-2025", date(2025, 6, 30), JUNE.as_bytes())
        .unwrap_err();
    assert!(matches!(err, PmsError::Authorization { .. }));
}
