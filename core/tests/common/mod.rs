//! Shared fixtures: one branch in one area, a full branch team, and
//! helpers for the usual admin setup steps.

#![allow(dead_code)]

use chrono::NaiveDate;
use pms_core::{
    category::KpiCategory,
    engine::PmsEngine,
    model::{AccountMapping, AccountStatus, Branch, Staff},
    plan_cascade_subsystem::ShareConfigInput,
    position::{Actor, Position},
};

pub const BRANCH: &str = "BR-001";
pub const AREA: &str = "AR-01";

pub fn build() -> PmsEngine {
    PmsEngine::build_test().expect("build_test failed")
}

pub fn admin() -> Actor {
    Actor::system()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn add_branch(engine: &PmsEngine, code: &str, area: &str) {
    engine
        .upsert_branch(
            &admin(),
            Branch {
                branch_code: code.into(),
                name: format!("{code} branch"),
                area_code: area.into(),
                region_code: "RG-1".into(),
            },
        )
        .unwrap();
}

pub fn add_staff(engine: &PmsEngine, id: &str, position: Position, branch: Option<&str>) -> Actor {
    engine
        .upsert_staff(
            &admin(),
            Staff {
                staff_id: id.into(),
                name: format!("Staff {id}"),
                position,
                branch_code: branch.map(str::to_string),
                area_code: None,
                active: true,
            },
        )
        .unwrap();
    Actor::new(id, position)
}

/// BM, MSM, accountant, sub-team leader and three MSOs in `BRANCH`.
pub struct Team {
    pub bm: Actor,
    pub msm: Actor,
    pub accountant: Actor,
    pub stl: Actor,
    pub msos: Vec<Actor>,
}

pub fn seed_team(engine: &PmsEngine) -> Team {
    add_branch(engine, BRANCH, AREA);
    Team {
        bm: add_staff(engine, "bm", Position::BranchManager, Some(BRANCH)),
        msm: add_staff(engine, "msm", Position::Msm, Some(BRANCH)),
        accountant: add_staff(engine, "acc", Position::Accountant, Some(BRANCH)),
        stl: add_staff(engine, "stl", Position::SubTeamLeader, Some(BRANCH)),
        msos: vec![
            add_staff(engine, "mso1", Position::MsoI, Some(BRANCH)),
            add_staff(engine, "mso2", Position::MsoII, Some(BRANCH)),
            add_staff(engine, "mso3", Position::MsoIII, Some(BRANCH)),
        ],
    }
}

pub fn default_shares(engine: &PmsEngine, category: KpiCategory, bm: f64, msm: f64, accountant: f64, mso: f64) {
    engine
        .save_share_config(
            &admin(),
            ShareConfigInput {
                branch_code: None,
                kpi_category: category,
                branch_manager: bm,
                msm,
                accountant,
                mso,
            },
        )
        .unwrap();
}

/// Owned, active, qualifying account written straight to the store.
pub fn owned_account(engine: &PmsEngine, account: &str, owner: &str, balance: f64, june_balance: f64) {
    engine
        .store
        .insert_account_mapping(&AccountMapping {
            account_number: account.into(),
            staff_id: Some(owner.into()),
            branch_code: BRANCH.into(),
            current_balance: balance,
            june_balance,
            last_transaction_date: Some(date(2025, 12, 1)),
            active_status: true,
            status: AccountStatus::Active,
            auto_balanced: false,
        })
        .unwrap();
}
