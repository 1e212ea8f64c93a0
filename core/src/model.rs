//! Persisted records and their status vocabularies.

use crate::{
    approval::{ApprovalChain, ApprovalStatus},
    category::{KpiCategory, TaskType},
    config::RatingThresholds,
    error::{PmsError, PmsResult},
    period::Period,
    position::Position,
    types::{BranchCode, EntityId, StaffId},
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store a type as TEXT using its own string conversions.
macro_rules! sql_text {
    ($ty:ty, $to:expr, $from:expr) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                let to: fn(&$ty) -> &'static str = $to;
                Ok(ToSqlOutput::from(to(self)))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let from: fn(&str) -> Option<$ty> = $from;
                let raw = value.as_str()?;
                from(raw).ok_or_else(|| {
                    FromSqlError::Other(format!("unexpected {} value '{raw}'", stringify!($ty)).into())
                })
            }
        }
    };
}

/// String-backed status enum with `as_str` / `parse`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> PmsResult<Self> {
                match raw {
                    $($text => Ok(Self::$variant),)+
                    other => Err(PmsError::validation(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }

        sql_text!($name, |v| v.as_str(), |s| $name::parse(s).ok());
    };
}

sql_text!(Position, |p| p.code(), Position::from_code);
sql_text!(KpiCategory, |c| c.code(), KpiCategory::parse);
sql_text!(TaskType, |t| t.label(), TaskType::from_label);
sql_text!(ApprovalStatus, |s| s.as_str(), |s| ApprovalStatus::parse(s).ok());

text_enum!(AccountStatus {
    Active => "Active",
    Inactive => "Inactive",
    Transferred => "Transferred",
});

text_enum!(PlanStatus {
    Draft => "Draft",
    Active => "Active",
    Completed => "Completed",
    Cancelled => "Cancelled",
});

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_move_to(&self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Draft, Self::Cancelled)
                | (Self::Active, Self::Cancelled)
        )
    }
}

text_enum!(MappingStatus {
    MappedToYou => "Mapped to You",
    MappedToAnotherStaff => "Mapped to Another Staff",
    Unmapped => "Unmapped",
});

text_enum!(ValidationStatus {
    Processing => "Processing",
    Completed => "Completed",
    Partial => "Partial",
    Failed => "Failed",
});

text_enum!(DiscrepancyType {
    AmountMismatch => "Amount_Mismatch",
    MissingInPms => "Missing_in_PMS",
    MissingInCbs => "Missing_in_CBS",
    AccountMismatch => "Account_Mismatch",
});

text_enum!(Rating {
    Outstanding => "Outstanding",
    VeryGood => "Very Good",
    Good => "Good",
    NeedsSupport => "Needs Support",
    Unsatisfactory => "Unsatisfactory",
});

impl Rating {
    /// Inclusive lower bounds.
    pub fn from_score(score: f64, t: &RatingThresholds) -> Self {
        if score >= t.outstanding {
            Self::Outstanding
        } else if score >= t.very_good {
            Self::VeryGood
        } else if score >= t.good {
            Self::Good
        } else if score >= t.needs_support {
            Self::NeedsSupport
        } else {
            Self::Unsatisfactory
        }
    }
}

text_enum!(ScoreStatus {
    Draft => "Draft",
    Calculated => "Calculated",
    Locked => "Locked",
    Finalized => "Finalized",
});

// ── Roster ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub branch_code: BranchCode,
    pub name: String,
    pub area_code: String,
    pub region_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub staff_id: StaffId,
    pub name: String,
    pub position: Position,
    pub branch_code: Option<BranchCode>,
    pub area_code: Option<String>,
    pub active: bool,
}

// ── Baselines and mapping ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineBalance {
    pub account_id: String,
    pub alt_account_number: Option<String>,
    pub branch_code: Option<BranchCode>,
    pub balance: f64,
    pub period: String,
    pub baseline_date: NaiveDate,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselinePeriodSummary {
    pub period: String,
    pub accounts: i64,
    pub total_balance: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMapping {
    pub account_number: String,
    pub staff_id: Option<StaffId>,
    pub branch_code: BranchCode,
    pub current_balance: f64,
    /// Baseline ("June") balance.
    pub june_balance: f64,
    pub last_transaction_date: Option<NaiveDate>,
    pub active_status: bool,
    pub status: AccountStatus,
    pub auto_balanced: bool,
}

impl AccountMapping {
    /// Whether this account counts toward KPI scoring.
    pub fn qualifies(&self, min_balance: f64) -> bool {
        self.status == AccountStatus::Active && self.current_balance >= min_balance && self.active_status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMapping {
    pub product_name: String,
    pub kpi_category: KpiCategory,
    pub active: bool,
}

// ── Plans ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: EntityId,
    pub branch_code: BranchCode,
    pub kpi_category: KpiCategory,
    pub period: String,
    pub target_value: f64,
    pub target_type: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConfig {
    pub config_id: EntityId,
    /// None is the default for every branch.
    pub branch_code: Option<BranchCode>,
    pub kpi_category: KpiCategory,
    pub branch_manager: f64,
    pub msm: f64,
    pub accountant: f64,
    pub mso: f64,
    pub total_percent: f64,
    pub active: bool,
}

impl ShareConfig {
    /// Share for a named position; MSO positions draw from the pool.
    pub fn share_for(&self, position: Position) -> f64 {
        match position {
            Position::BranchManager => self.branch_manager,
            Position::Msm => self.msm,
            Position::Accountant => self.accountant,
            p if p.is_mso() => self.mso,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffPlan {
    pub staff_plan_id: EntityId,
    pub plan_id: EntityId,
    pub staff_id: StaffId,
    pub position: Position,
    pub kpi_category: KpiCategory,
    pub period: String,
    pub individual_target: f64,
    pub yearly_target: f64,
    pub monthly_target: f64,
    pub weekly_target: f64,
    pub daily_target: f64,
    pub share_percent: f64,
    pub status: PlanStatus,
}

// ── Tasks ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTask {
    pub task_id: EntityId,
    pub task_type: TaskType,
    pub account_number: Option<String>,
    pub amount: f64,
    pub submitter_id: StaffId,
    pub branch_code: BranchCode,
    pub mapping_status: MappingStatus,
    pub kpi_eligible: bool,
    pub approval_status: ApprovalStatus,
    pub approval_chain: ApprovalChain,
    pub cbs_validated: bool,
    pub validation_ref: Option<EntityId>,
    pub task_date: NaiveDate,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

// ── CBS validation ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmappedProduct {
    pub product_name: String,
    pub account_count: usize,
    pub total_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number, header excluded.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbsDiscrepancy {
    pub discrepancy_id: EntityId,
    pub validation_id: EntityId,
    pub account_number: String,
    pub task_id: Option<EntityId>,
    pub cbs_amount: f64,
    pub pms_amount: f64,
    pub difference: f64,
    pub discrepancy_type: DiscrepancyType,
    pub resolved: bool,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<StaffId>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbsValidation {
    pub validation_id: EntityId,
    pub branch_code: BranchCode,
    pub validation_date: NaiveDate,
    pub file_name: String,
    pub uploaded_by: StaffId,
    pub total_records: usize,
    pub matched_records: usize,
    pub unmatched_records: usize,
    pub discrepancy_count: usize,
    pub status: ValidationStatus,
    pub validation_rate: f64,
    pub unmapped_products: Vec<UnmappedProduct>,
    pub row_errors: Vec<RowError>,
    pub discrepancies: Vec<CbsDiscrepancy>,
    pub created_at: DateTime<Utc>,
}

// ── Evaluations and scores ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competency {
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralEvaluation {
    pub evaluation_id: EntityId,
    pub staff_id: StaffId,
    pub evaluator_id: StaffId,
    pub branch_code: BranchCode,
    pub period: String,
    pub competencies: Vec<Competency>,
    /// Normalized to the 15-point behavioral scale.
    pub total_score: f64,
    pub approval_status: ApprovalStatus,
    pub approval_chain: ApprovalChain,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub target: f64,
    pub actual: f64,
    pub percent: f64,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    pub score_id: EntityId,
    pub staff_id: StaffId,
    pub branch_code: BranchCode,
    pub period: Period,
    pub kpi_scores: BTreeMap<KpiCategory, CategoryScore>,
    pub kpi_total_score: f64,
    pub behavioral_score: f64,
    pub evaluation_id: Option<EntityId>,
    pub final_score: f64,
    pub rating: Rating,
    pub status: ScoreStatus,
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds_are_inclusive() {
        let t = RatingThresholds::default();
        assert_eq!(Rating::from_score(90.0, &t), Rating::Outstanding);
        assert_eq!(Rating::from_score(89.99, &t), Rating::VeryGood);
        assert_eq!(Rating::from_score(80.0, &t), Rating::VeryGood);
        assert_eq!(Rating::from_score(70.0, &t), Rating::Good);
        assert_eq!(Rating::from_score(60.0, &t), Rating::NeedsSupport);
        assert_eq!(Rating::from_score(59.99, &t), Rating::Unsatisfactory);
    }

    #[test]
    fn plan_transitions() {
        assert!(PlanStatus::Draft.can_move_to(PlanStatus::Active));
        assert!(PlanStatus::Active.can_move_to(PlanStatus::Cancelled));
        assert!(!PlanStatus::Completed.can_move_to(PlanStatus::Active));
        assert!(!PlanStatus::Cancelled.can_move_to(PlanStatus::Draft));
    }

    #[test]
    fn text_enums_parse_their_labels() {
        assert_eq!(MappingStatus::parse("Mapped to You").unwrap(), MappingStatus::MappedToYou);
        assert_eq!(DiscrepancyType::parse("Missing_in_PMS").unwrap(), DiscrepancyType::MissingInPms);
        assert!(ValidationStatus::parse("Done").is_err());
    }

    #[test]
    fn qualifying_accounts() {
        let mut m = AccountMapping {
            account_number: "A1".into(),
            staff_id: Some("s1".into()),
            branch_code: "BR1".into(),
            current_balance: 500.0,
            june_balance: 0.0,
            last_transaction_date: None,
            active_status: true,
            status: AccountStatus::Active,
            auto_balanced: false,
        };
        assert!(m.qualifies(500.0));
        m.current_balance = 499.99;
        assert!(!m.qualifies(500.0));
        m.current_balance = 900.0;
        m.active_status = false;
        assert!(!m.qualifies(500.0));
    }
}
