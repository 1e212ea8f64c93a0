//! CBS reconciliation: match a core-banking extract against approved tasks.
//!
//! Steps, each committed on its own:
//!   1. Balance refresh     upsert every row's mapping, backfill baselines
//!   2. Product check       report products with no KPI category
//!   3. Auto-mapping        unowned qualifying accounts go to the submitter
//!                          of an approved, unmapped task for the same day
//!   4. Matching            account + amount within tolerance
//!   5. Persist             totals, discrepancies, final status
//!
//! A failure after the header row is written marks the validation Failed.
//! Committed steps stay in place; re-uploading the same file is safe since
//! every write is keyed by account number or task id.

use crate::{
    cbs_extract::{CbsExtract, CbsRow},
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{
        AccountMapping, AccountStatus, CbsDiscrepancy, CbsValidation, DailyTask, DiscrepancyType,
        MappingStatus, RowError, UnmappedProduct, ValidationStatus,
    },
    position::{Actor, Position},
    store::{NewValidation, PmsStore},
    subsystem::{Ctx, Outcome},
    types::{new_id, round2},
};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Result of the matching step.
#[derive(Debug, Default)]
struct MatchSummary {
    matched: usize,
    discrepancies: Vec<CbsDiscrepancy>,
}

pub struct CbsReconciliationSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> CbsReconciliationSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    /// Administrators, or the branch's own manager or accountant.
    fn require_branch_finance(&self, actor: &Actor, branch_code: &str, action: &str) -> PmsResult<()> {
        if actor.position.can_administer() {
            return Ok(());
        }
        if matches!(actor.position, Position::BranchManager | Position::Accountant) {
            let staff = self.ctx.store.get_staff(&actor.staff_id)?;
            if staff.and_then(|s| s.branch_code).as_deref() == Some(branch_code) {
                return Ok(());
            }
        }
        Err(PmsError::unauthorized(&actor.staff_id, action))
    }

    pub fn reconcile(
        &self,
        actor: &Actor,
        branch_code: &str,
        validation_date: NaiveDate,
        file_name: &str,
        extract: CbsExtract,
    ) -> PmsResult<Outcome<CbsValidation>> {
        self.require_branch_finance(actor, branch_code, "upload CBS extracts")?;
        let store = self.ctx.store;
        if store.get_branch(branch_code)?.is_none() {
            return Err(PmsError::not_found("branch", branch_code));
        }

        let validation_id = new_id();
        store.insert_validation(&NewValidation {
            validation_id: &validation_id,
            branch_code,
            validation_date,
            file_name,
            uploaded_by: &actor.staff_id,
        })?;

        match self.run_steps(&validation_id, branch_code, validation_date, extract) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::error!("CBS validation {validation_id} failed: {err}");
                if let Err(mark) = store.set_validation_status(&validation_id, ValidationStatus::Failed) {
                    log::error!("could not mark validation {validation_id} failed: {mark}");
                }
                Err(err)
            }
        }
    }

    fn run_steps(
        &self,
        validation_id: &str,
        branch_code: &str,
        validation_date: NaiveDate,
        extract: CbsExtract,
    ) -> PmsResult<Outcome<CbsValidation>> {
        let store = self.ctx.store;
        let CbsExtract { rows, errors } = extract;

        store.with_transaction(|store| self.refresh_balances(store, branch_code, validation_date, &rows))?;
        let unmapped_products = self.unmapped_products(&rows)?;
        let mut events =
            store.with_transaction(|store| self.auto_map(store, branch_code, validation_date, &rows))?;
        let summary = store.with_transaction(|store| {
            self.match_tasks(store, validation_id, branch_code, validation_date, &rows)
        })?;

        let total = rows.len();
        let status = if summary.discrepancies.is_empty() && unmapped_products.is_empty() {
            ValidationStatus::Completed
        } else {
            ValidationStatus::Partial
        };
        let validation = CbsValidation {
            validation_id: validation_id.to_string(),
            branch_code: branch_code.to_string(),
            validation_date,
            file_name: String::new(),
            uploaded_by: String::new(),
            total_records: total,
            matched_records: summary.matched,
            unmatched_records: total.saturating_sub(summary.matched),
            discrepancy_count: summary.discrepancies.len(),
            status,
            validation_rate: validation_rate(summary.matched, total),
            unmapped_products,
            row_errors: errors,
            discrepancies: summary.discrepancies,
            created_at: Utc::now(),
        };
        store.with_transaction(|store| store.complete_validation(&validation))?;

        // Re-read so header fields written at insert time come back too.
        let validation = store
            .get_validation(validation_id)?
            .ok_or_else(|| PmsError::not_found("cbs_validation", validation_id))?;
        log::info!(
            "CBS validation {validation_id} for {branch_code} on {validation_date}: {}/{} matched, {} discrepancies, {}",
            validation.matched_records,
            validation.total_records,
            validation.discrepancy_count,
            validation.status.as_str()
        );
        events.push(AuditEvent::CbsValidationCompleted {
            validation_id: validation_id.to_string(),
            branch_code: branch_code.to_string(),
            validation_date,
            total_records: validation.total_records,
            matched_records: validation.matched_records,
            discrepancies: validation.discrepancy_count,
            status: validation.status.as_str().to_string(),
        });
        Ok(Outcome::new(validation, events))
    }

    // ── Step 1: balance refresh ───────────────────────────────────

    fn refresh_balances(
        &self,
        store: &PmsStore,
        branch_code: &str,
        validation_date: NaiveDate,
        rows: &[CbsRow],
    ) -> PmsResult<()> {
        let window = Duration::days(self.ctx.config.mapping.activity_window_days);
        let cutoff = validation_date - window;

        for row in rows {
            let existing = store.get_account_mapping(&row.account_number)?;
            let last_transaction_date = row
                .transaction_date
                .or_else(|| existing.as_ref().and_then(|m| m.last_transaction_date));
            let active_status = last_transaction_date.is_some_and(|d| d >= cutoff);

            match existing {
                None => {
                    let june_balance = baseline_balance(store, &row.account_number)?;
                    store.insert_account_mapping(&AccountMapping {
                        account_number: row.account_number.clone(),
                        staff_id: None,
                        branch_code: branch_code.to_string(),
                        current_balance: row.balance,
                        june_balance,
                        last_transaction_date,
                        active_status,
                        status: AccountStatus::Active,
                        auto_balanced: false,
                    })?;
                    log::debug!("new account {} seen in CBS", row.account_number);
                }
                Some(m) => {
                    let june_balance = if m.june_balance == 0.0 {
                        baseline_balance(store, &row.account_number)?
                    } else {
                        m.june_balance
                    };
                    store.update_mapping_balances(
                        &row.account_number,
                        row.balance,
                        june_balance,
                        last_transaction_date,
                        active_status,
                    )?;
                }
            }
        }
        Ok(())
    }

    // ── Step 2: unmapped products ─────────────────────────────────

    fn unmapped_products(&self, rows: &[CbsRow]) -> PmsResult<Vec<UnmappedProduct>> {
        let known: HashSet<String> = self
            .ctx
            .store
            .active_product_mappings()?
            .into_iter()
            .map(|p| normalize_product(&p.product_name))
            .collect();

        // product -> account -> latest balance seen
        let mut by_product: BTreeMap<String, BTreeMap<&str, f64>> = BTreeMap::new();
        for row in rows {
            let Some(product) = row.product.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
                continue;
            };
            if known.contains(&normalize_product(product)) {
                continue;
            }
            by_product
                .entry(product.to_string())
                .or_default()
                .insert(row.account_number.as_str(), row.balance);
        }

        let unmapped: Vec<UnmappedProduct> = by_product
            .into_iter()
            .map(|(product_name, accounts)| UnmappedProduct {
                product_name,
                account_count: accounts.len(),
                total_balance: round2(accounts.values().sum()),
            })
            .collect();
        for p in &unmapped {
            log::warn!("unmapped CBS product '{}' ({} accounts)", p.product_name, p.account_count);
        }
        Ok(unmapped)
    }

    // ── Step 3: auto-mapping ──────────────────────────────────────

    fn auto_map(
        &self,
        store: &PmsStore,
        branch_code: &str,
        validation_date: NaiveDate,
        rows: &[CbsRow],
    ) -> PmsResult<Vec<AuditEvent>> {
        let min_balance = self.ctx.config.mapping.min_qualifying_balance;
        let mut seen = BTreeSet::new();
        let mut events = Vec::new();

        for row in rows.iter().filter(|r| r.balance >= min_balance) {
            if !seen.insert(row.account_number.as_str()) {
                continue;
            }
            let Some(mapping) = store.get_account_mapping(&row.account_number)? else {
                continue;
            };
            if mapping.staff_id.is_some() {
                continue;
            }
            let Some(task) = store.approved_unmapped_task_for(&row.account_number, branch_code, validation_date)?
            else {
                continue;
            };
            if !store.assign_account_owner(&row.account_number, None, &task.submitter_id, false)? {
                log::debug!("{} was claimed concurrently", row.account_number);
                continue;
            }
            store.set_task_mapping_status(&task.task_id, MappingStatus::MappedToYou)?;
            log::debug!("auto-mapped {} to {}", row.account_number, task.submitter_id);
            events.push(AuditEvent::AccountAutoMapped {
                account_number: row.account_number.clone(),
                staff_id: task.submitter_id,
                task_id: task.task_id,
            });
        }
        Ok(events)
    }

    // ── Step 4: matching ──────────────────────────────────────────

    fn match_tasks(
        &self,
        store: &PmsStore,
        validation_id: &str,
        branch_code: &str,
        validation_date: NaiveDate,
        rows: &[CbsRow],
    ) -> PmsResult<MatchSummary> {
        let tolerance = self.ctx.config.reconciliation.amount_tolerance;
        let tasks: Vec<DailyTask> = store
            .approved_tasks_on(branch_code, validation_date)?
            .into_iter()
            .filter(|t| t.account_number.is_some())
            .collect();

        let mut summary = MatchSummary::default();
        let mut matched: HashSet<String> = HashSet::new();

        for row in rows {
            let for_account: Vec<&DailyTask> = tasks
                .iter()
                .filter(|t| t.account_number.as_deref() == Some(row.account_number.as_str()))
                .collect();
            let hit = for_account
                .iter()
                .find(|t| !matched.contains(t.task_id.as_str()) && amounts_match(t.amount, row.amount, tolerance));

            if let Some(task) = hit {
                store.mark_task_validated(&task.task_id, validation_id)?;
                matched.insert(task.task_id.clone());
                summary.matched += 1;
                continue;
            }

            // Closest unmatched task for the account, if there is one.
            let nearest = for_account
                .iter()
                .filter(|t| !matched.contains(t.task_id.as_str()))
                .min_by(|a, b| {
                    let da = (a.amount - row.amount).abs();
                    let db = (b.amount - row.amount).abs();
                    da.total_cmp(&db)
                });

            let discrepancy = match nearest {
                Some(task) => discrepancy(
                    validation_id,
                    &row.account_number,
                    Some(task.task_id.clone()),
                    row.amount,
                    task.amount,
                    DiscrepancyType::AmountMismatch,
                ),
                None => discrepancy(
                    validation_id,
                    &row.account_number,
                    None,
                    row.amount,
                    0.0,
                    DiscrepancyType::MissingInPms,
                ),
            };
            log::debug!(
                "row {}: {} on {}",
                row.row,
                discrepancy.discrepancy_type.as_str(),
                row.account_number
            );
            summary.discrepancies.push(discrepancy);
        }

        // Every approved task left unmatched is missing from CBS, including
        // one that also drew an amount mismatch above.
        for task in tasks.iter().filter(|t| !matched.contains(t.task_id.as_str())) {
            summary.discrepancies.push(discrepancy(
                validation_id,
                task.account_number.as_deref().unwrap_or_default(),
                Some(task.task_id.clone()),
                0.0,
                task.amount,
                DiscrepancyType::MissingInCbs,
            ));
        }
        Ok(summary)
    }

    // ── Resolution ────────────────────────────────────────────────

    pub fn resolve_discrepancy(
        &self,
        actor: &Actor,
        discrepancy_id: &str,
        note: &str,
    ) -> PmsResult<Outcome<CbsDiscrepancy>> {
        let store = self.ctx.store;
        let note = note.trim();
        if note.is_empty() {
            return Err(PmsError::validation("a resolution note is required"));
        }
        let discrepancy = store
            .get_discrepancy(discrepancy_id)?
            .ok_or_else(|| PmsError::not_found("cbs_discrepancy", discrepancy_id))?;
        let validation = store
            .get_validation(&discrepancy.validation_id)?
            .ok_or_else(|| PmsError::not_found("cbs_validation", &discrepancy.validation_id))?;
        self.require_branch_finance(actor, &validation.branch_code, "resolve CBS discrepancies")?;

        if !store.resolve_discrepancy(discrepancy_id, &actor.staff_id, note, Utc::now())? {
            return Err(PmsError::conflict(format!("discrepancy {discrepancy_id} is already resolved")));
        }
        let resolved = store
            .get_discrepancy(discrepancy_id)?
            .ok_or_else(|| PmsError::not_found("cbs_discrepancy", discrepancy_id))?;
        let event = AuditEvent::DiscrepancyResolved {
            discrepancy_id: discrepancy_id.to_string(),
            account_number: resolved.account_number.clone(),
        };
        Ok(Outcome::single(resolved, event))
    }

    pub fn validation_summary(&self, validation_id: &str) -> PmsResult<CbsValidation> {
        self.ctx
            .store
            .get_validation(validation_id)?
            .ok_or_else(|| PmsError::not_found("cbs_validation", validation_id))
    }
}

/// Inclusive at the edge; the epsilon absorbs binary representation noise
/// so that a difference of exactly 0.01 still matches.
pub fn amounts_match(task_amount: f64, cbs_amount: f64, tolerance: f64) -> bool {
    (task_amount - cbs_amount).abs() <= tolerance + 1e-9
}

pub fn validation_rate(matched: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(matched as f64 / total as f64 * 100.0)
    }
}

fn normalize_product(name: &str) -> String {
    name.trim().to_lowercase()
}

fn baseline_balance(store: &PmsStore, account_number: &str) -> PmsResult<f64> {
    Ok(store
        .active_baseline_for(account_number)?
        .map(|b| b.balance)
        .unwrap_or(0.0))
}

fn discrepancy(
    validation_id: &str,
    account_number: &str,
    task_id: Option<String>,
    cbs_amount: f64,
    pms_amount: f64,
    discrepancy_type: DiscrepancyType,
) -> CbsDiscrepancy {
    CbsDiscrepancy {
        discrepancy_id: new_id(),
        validation_id: validation_id.to_string(),
        account_number: account_number.to_string(),
        task_id,
        cbs_amount,
        pms_amount,
        difference: round2((cbs_amount - pms_amount).abs()),
        discrepancy_type,
        resolved: false,
        resolution_note: None,
        resolved_by: None,
        resolved_at: None,
    }
}
