//! Staff positions.
//!
//! One canonical representation is used everywhere in the core. Display
//! strings and historical spellings are only accepted at the boundary via
//! `Position::from_external`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    BranchManager,
    /// Member service manager, the branch line manager.
    Msm,
    Accountant,
    SubTeamLeader,
    MsoI,
    MsoII,
    MsoIII,
    AreaManager,
    RegionalDirector,
    HqAdmin,
}

impl Position {
    pub const ALL: [Position; 10] = [
        Position::BranchManager,
        Position::Msm,
        Position::Accountant,
        Position::SubTeamLeader,
        Position::MsoI,
        Position::MsoII,
        Position::MsoIII,
        Position::AreaManager,
        Position::RegionalDirector,
        Position::HqAdmin,
    ];

    /// Canonical internal code, used for persistence.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BranchManager => "branch_manager",
            Self::Msm => "msm",
            Self::Accountant => "accountant",
            Self::SubTeamLeader => "sub_team_leader",
            Self::MsoI => "mso_i",
            Self::MsoII => "mso_ii",
            Self::MsoIII => "mso_iii",
            Self::AreaManager => "area_manager",
            Self::RegionalDirector => "regional_director",
            Self::HqAdmin => "hq_admin",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::BranchManager => "Branch Manager",
            Self::Msm => "MSM",
            Self::Accountant => "Accountant",
            Self::SubTeamLeader => "Sub Team Leader",
            Self::MsoI => "MSO I",
            Self::MsoII => "MSO II",
            Self::MsoIII => "MSO III",
            Self::AreaManager => "Area Manager",
            Self::RegionalDirector => "Regional Director",
            Self::HqAdmin => "HQ Admin",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    /// Parse any external spelling: canonical code, display string, or one of
    /// the historical variants found in roster exports.
    pub fn from_external(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let position = match key.as_str() {
            "branch manager" | "bm" => Self::BranchManager,
            "msm" | "line manager" | "member service manager" => Self::Msm,
            "accountant" => Self::Accountant,
            "sub team leader" | "subteam leader" | "stl" => Self::SubTeamLeader,
            "mso i" | "mso 1" | "member service officer i" | "junior mso" => Self::MsoI,
            "mso ii" | "mso 2" | "member service officer ii" | "mso" => Self::MsoII,
            "mso iii" | "mso 3" | "member service officer iii" | "senior mso" => Self::MsoIII,
            "area manager" | "am" => Self::AreaManager,
            "regional director" | "region director" => Self::RegionalDirector,
            "hq admin" | "admin" | "hq" => Self::HqAdmin,
            _ => return None,
        };
        Some(position)
    }

    /// Frontline officer positions that form the MSO pool.
    pub fn is_mso(&self) -> bool {
        matches!(self, Self::MsoI | Self::MsoII | Self::MsoIII)
    }

    /// Positions that receive a cascaded staff plan.
    pub fn is_plan_eligible(&self) -> bool {
        self.is_mso() || matches!(self, Self::BranchManager | Self::Msm | Self::Accountant)
    }

    /// Positions allowed to manage plans, configuration and baselines.
    pub fn can_administer(&self) -> bool {
        matches!(self, Self::HqAdmin | Self::RegionalDirector)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display())
    }
}

/// The staff member performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub staff_id: String,
    pub position: Position,
}

impl Actor {
    pub fn new(staff_id: impl Into<String>, position: Position) -> Self {
        Self {
            staff_id: staff_id.into(),
            position,
        }
    }

    /// The runner and scheduled jobs act as this.
    pub fn system() -> Self {
        Self::new("system", Position::HqAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_code_round_trip_through_external_parser() {
        for p in Position::ALL {
            assert_eq!(Position::from_external(p.display()), Some(p));
            assert_eq!(Position::from_code(p.code()), Some(p));
        }
    }

    #[test]
    fn historical_spellings_are_accepted() {
        assert_eq!(Position::from_external("Line Manager"), Some(Position::Msm));
        assert_eq!(Position::from_external("  member-service officer  III"), Some(Position::MsoIII));
        assert_eq!(Position::from_external("BRANCH_MANAGER"), Some(Position::BranchManager));
        assert_eq!(Position::from_external("Teller"), None);
    }

    #[test]
    fn eligibility() {
        assert!(Position::MsoI.is_plan_eligible());
        assert!(Position::Accountant.is_plan_eligible());
        assert!(!Position::SubTeamLeader.is_plan_eligible());
        assert!(!Position::AreaManager.is_plan_eligible());
        assert!(Position::HqAdmin.can_administer());
        assert!(!Position::BranchManager.can_administer());
    }
}
