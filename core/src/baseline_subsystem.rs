//! Baseline ("June") balances: import and the single-active-period rule.

use crate::{
    cbs_extract::{parse_amount, BaselineRecord},
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{BaselineBalance, BaselinePeriodSummary, RowError},
    position::Actor,
    subsystem::{require_admin, Ctx, Outcome},
};
use chrono::NaiveDate;
use serde::Serialize;

/// Per-row outcome counts of a partial-success upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

pub struct BaselineSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> BaselineSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    /// Upsert baseline rows for `period`. Bad rows are reported, never fatal;
    /// `unreadable` carries rows the reader already rejected.
    pub fn import_baseline(
        &self,
        actor: &Actor,
        period: &str,
        baseline_date: NaiveDate,
        records: &[BaselineRecord],
        unreadable: Vec<RowError>,
    ) -> PmsResult<Outcome<ImportReport>> {
        require_admin(actor, "import baseline balances")?;
        let period = period.trim();
        if period.is_empty() {
            return Err(PmsError::validation("baseline period label is required"));
        }
        let store = self.ctx.store;
        let period_active = store.active_baseline_periods()?.iter().any(|p| p == period);

        let mut report = store.with_transaction(|store| {
            let mut report = ImportReport::default();
            for record in records {
                match baseline_row(record, period, baseline_date, period_active) {
                    Ok(balance) => {
                        if store.upsert_baseline(&balance)? {
                            report.inserted += 1;
                        } else {
                            report.updated += 1;
                        }
                    }
                    Err(message) => {
                        log::warn!("baseline row {} skipped: {message}", record.row);
                        report.failed += 1;
                        report.errors.push(RowError { row: record.row, message });
                    }
                }
            }
            Ok(report)
        })?;
        if !unreadable.is_empty() {
            report.failed += unreadable.len();
            report.errors.extend(unreadable);
            report.errors.sort_by_key(|e| e.row);
        }

        log::info!(
            "baseline {period}: {} inserted, {} updated, {} failed",
            report.inserted,
            report.updated,
            report.failed
        );
        let event = AuditEvent::BaselineImported {
            period: period.to_string(),
            inserted: report.inserted,
            updated: report.updated,
            failed: report.failed,
        };
        Ok(Outcome::single(report, event))
    }

    /// Make `period` the only active baseline period. Deactivate-all and
    /// activate-target commit together or not at all.
    pub fn activate_period(&self, actor: &Actor, period: &str) -> PmsResult<Outcome<usize>> {
        require_admin(actor, "activate a baseline period")?;
        let store = self.ctx.store;
        if store.baseline_period_row_count(period)? == 0 {
            return Err(PmsError::not_found("baseline_period", period));
        }
        let (deactivated, activated) = store.with_transaction(|store| {
            let deactivated = store.deactivate_all_baselines()?;
            let activated = store.set_baseline_period_active(period, true)?;
            Ok((deactivated, activated))
        })?;
        log::info!("baseline period {period} active ({activated} rows)");
        let event = AuditEvent::BaselinePeriodActivated {
            period: period.to_string(),
            deactivated,
        };
        Ok(Outcome::single(activated, event))
    }

    pub fn deactivate_period(&self, actor: &Actor, period: &str) -> PmsResult<Outcome<usize>> {
        require_admin(actor, "deactivate a baseline period")?;
        let store = self.ctx.store;
        if store.baseline_period_row_count(period)? == 0 {
            return Err(PmsError::not_found("baseline_period", period));
        }
        let changed = store.set_baseline_period_active(period, false)?;
        let event = AuditEvent::BaselinePeriodDeactivated { period: period.to_string() };
        Ok(Outcome::single(changed, event))
    }

    /// Baseline for an account in the active period, by account id or the
    /// alternate account number.
    pub fn active_baseline_for(&self, account: &str) -> PmsResult<Option<BaselineBalance>> {
        self.ctx.store.active_baseline_for(account)
    }

    pub fn list_periods(&self) -> PmsResult<Vec<BaselinePeriodSummary>> {
        self.ctx.store.baseline_periods()
    }
}

fn baseline_row(
    record: &BaselineRecord,
    period: &str,
    baseline_date: NaiveDate,
    is_active: bool,
) -> Result<BaselineBalance, String> {
    let account_id = record.account_id.trim();
    if account_id.is_empty() {
        return Err("missing account_id".into());
    }
    let balance = parse_amount(&record.june_balance)
        .ok_or_else(|| format!("unparseable june_balance '{}'", record.june_balance))?;
    if balance < 0.0 {
        return Err(format!("negative june_balance {balance}"));
    }
    Ok(BaselineBalance {
        account_id: account_id.to_string(),
        alt_account_number: record.account_number.clone(),
        branch_code: record.branch_code.clone(),
        balance,
        period: period.to_string(),
        baseline_date,
        is_active,
    })
}
