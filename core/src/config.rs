//! Runtime tuning loaded from `pms_config.json` in the data directory.
//! Every field has a default, so a partial file is enough.

use crate::category::KpiCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Scoring ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Share of the final score carried by the KPI block.
    pub kpi_share: f64,
    /// Share of the final score carried by the behavioral evaluation.
    pub behavioral_share: f64,
    pub category_weights: BTreeMap<KpiCategory, f64>,
    pub rating_thresholds: RatingThresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingThresholds {
    pub outstanding: f64,
    pub very_good: f64,
    pub good: f64,
    pub needs_support: f64,
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self {
            outstanding: 90.0,
            very_good: 80.0,
            good: 70.0,
            needs_support: 60.0,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            kpi_share: 85.0,
            behavioral_share: 15.0,
            category_weights: [
                (KpiCategory::DepositMobilization, 25.0),
                (KpiCategory::DigitalChannelGrowth, 20.0),
                (KpiCategory::MemberRegistration, 20.0),
                (KpiCategory::ShareholderRecruitment, 15.0),
                (KpiCategory::LoanNpl, 10.0),
                (KpiCategory::CustomerBase, 10.0),
            ]
            .into(),
            rating_thresholds: RatingThresholds::default(),
        }
    }
}

impl ScoringConfig {
    pub fn weight(&self, category: KpiCategory) -> f64 {
        self.category_weights.get(&category).copied().unwrap_or(0.0)
    }
}

// ── Account mapping ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Accounts below this balance never count toward scoring.
    pub min_qualifying_balance: f64,
    /// An account is active when it moved within this many days of validation.
    pub activity_window_days: i64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            min_qualifying_balance: 500.0,
            activity_window_days: 15,
        }
    }
}

// ── CBS reconciliation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub amount_tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 0.01,
        }
    }
}

// ── Approvals ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Tasks whose submitter has no approval template resolve straight to
    /// Approved when set; otherwise they stay Pending.
    pub auto_approve_empty_chain: bool,
}

// ── Top level ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PmsConfig {
    pub scoring: ScoringConfig,
    pub mapping: MappingConfig,
    pub reconciliation: ReconciliationConfig,
    pub approval: ApprovalConfig,
}

impl PmsConfig {
    /// Load from `{data_dir}/pms_config.json`.
    /// In tests, use PmsConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/pms_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PmsConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded configuration from {path}");
        Ok(config)
    }

    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let weights: f64 = self.scoring.category_weights.values().sum();
        if (weights - 100.0).abs() > 1e-6 {
            anyhow::bail!("category weights must sum to 100, got {weights}");
        }
        for category in KpiCategory::ALL {
            if !self.scoring.category_weights.contains_key(&category) {
                anyhow::bail!("missing weight for category {category}");
            }
        }
        let shares = self.scoring.kpi_share + self.scoring.behavioral_share;
        if (shares - 100.0).abs() > 1e-6 {
            anyhow::bail!("kpi_share + behavioral_share must be 100, got {shares}");
        }
        if self.reconciliation.amount_tolerance < 0.0 {
            anyhow::bail!("amount_tolerance must not be negative");
        }
        if self.mapping.activity_window_days < 0 {
            anyhow::bail!("activity_window_days must not be negative");
        }
        Ok(())
    }
}
