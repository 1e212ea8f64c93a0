//! KPI categories and the task types that feed them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KpiCategory {
    #[serde(rename = "Deposit_Mobilization")]
    DepositMobilization,
    #[serde(rename = "Digital_Channel_Growth")]
    DigitalChannelGrowth,
    #[serde(rename = "Member_Registration")]
    MemberRegistration,
    #[serde(rename = "Shareholder_Recruitment")]
    ShareholderRecruitment,
    #[serde(rename = "Loan_NPL")]
    LoanNpl,
    #[serde(rename = "Customer_Base")]
    CustomerBase,
}

impl KpiCategory {
    pub const ALL: [KpiCategory; 6] = [
        KpiCategory::DepositMobilization,
        KpiCategory::DigitalChannelGrowth,
        KpiCategory::MemberRegistration,
        KpiCategory::ShareholderRecruitment,
        KpiCategory::LoanNpl,
        KpiCategory::CustomerBase,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::DepositMobilization => "Deposit_Mobilization",
            Self::DigitalChannelGrowth => "Digital_Channel_Growth",
            Self::MemberRegistration => "Member_Registration",
            Self::ShareholderRecruitment => "Shareholder_Recruitment",
            Self::LoanNpl => "Loan_NPL",
            Self::CustomerBase => "Customer_Base",
        }
    }

    /// Accepts the canonical code or a spaced display form
    /// ("Deposit Mobilization", "Loan & NPL").
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw
            .trim()
            .to_ascii_lowercase()
            .replace('&', " ")
            .replace(['_', '-'], " ");
        let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
        let category = match key.as_str() {
            "deposit mobilization" => Self::DepositMobilization,
            "digital channel growth" => Self::DigitalChannelGrowth,
            "member registration" => Self::MemberRegistration,
            "shareholder recruitment" => Self::ShareholderRecruitment,
            "loan npl" => Self::LoanNpl,
            "customer base" => Self::CustomerBase,
            _ => return None,
        };
        Some(category)
    }

    /// The task type counted for this category, if it is count/amount based.
    pub fn scoring_task_type(&self) -> Option<TaskType> {
        match self {
            Self::DepositMobilization => None,
            Self::DigitalChannelGrowth => Some(TaskType::DigitalChannelGrowth),
            Self::MemberRegistration => Some(TaskType::MemberRegistration),
            Self::ShareholderRecruitment => Some(TaskType::ShareholderRecruitment),
            Self::LoanNpl => Some(TaskType::LoanFollowUp),
            Self::CustomerBase => Some(TaskType::CustomerBase),
        }
    }
}

impl std::fmt::Display for KpiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    #[serde(rename = "Deposit Mobilization")]
    DepositMobilization,
    #[serde(rename = "Digital Channel Growth")]
    DigitalChannelGrowth,
    #[serde(rename = "Member Registration")]
    MemberRegistration,
    #[serde(rename = "Shareholder Recruitment")]
    ShareholderRecruitment,
    #[serde(rename = "Loan Follow-up")]
    LoanFollowUp,
    #[serde(rename = "Customer Base")]
    CustomerBase,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::DepositMobilization,
        TaskType::DigitalChannelGrowth,
        TaskType::MemberRegistration,
        TaskType::ShareholderRecruitment,
        TaskType::LoanFollowUp,
        TaskType::CustomerBase,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::DepositMobilization => "Deposit Mobilization",
            Self::DigitalChannelGrowth => "Digital Channel Growth",
            Self::MemberRegistration => "Member Registration",
            Self::ShareholderRecruitment => "Shareholder Recruitment",
            Self::LoanFollowUp => "Loan Follow-up",
            Self::CustomerBase => "Customer Base",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.label() == label)
    }

    /// Task types that must name a bank account.
    pub fn requires_account(&self) -> bool {
        matches!(
            self,
            Self::DepositMobilization | Self::LoanFollowUp | Self::DigitalChannelGrowth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_display_forms() {
        assert_eq!(KpiCategory::parse("Loan & NPL"), Some(KpiCategory::LoanNpl));
        assert_eq!(KpiCategory::parse("Loan_NPL"), Some(KpiCategory::LoanNpl));
        assert_eq!(
            KpiCategory::parse("deposit mobilization"),
            Some(KpiCategory::DepositMobilization)
        );
        assert_eq!(KpiCategory::parse("Savings"), None);
        for c in KpiCategory::ALL {
            assert_eq!(KpiCategory::parse(c.code()), Some(c));
        }
    }

    #[test]
    fn task_labels_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(TaskType::from_label(t.label()), Some(t));
        }
    }
}
