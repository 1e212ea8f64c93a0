//! Account mapping registry: who gets credit for which account.
//!
//! Owner changes go through `PmsStore::assign_account_owner`, a conditional
//! update on the current owner, so two writers can never both win.

use crate::{
    category::KpiCategory,
    error::{PmsError, PmsResult},
    event::AuditEvent,
    model::{AccountMapping, AccountStatus, ProductMapping, Staff},
    position::{Actor, Position},
    subsystem::{require_admin, Ctx, Outcome},
};
use std::collections::BTreeMap;

pub struct MappingSubsystem<'a> {
    ctx: Ctx<'a>,
}

impl<'a> MappingSubsystem<'a> {
    pub fn new(ctx: Ctx<'a>) -> Self {
        Self { ctx }
    }

    /// Administrators anywhere, branch managers inside their own branch.
    fn require_mapping_rights(&self, actor: &Actor, branch_code: &str) -> PmsResult<()> {
        if actor.position.can_administer() {
            return Ok(());
        }
        if actor.position == Position::BranchManager {
            let staff = self.ctx.store.get_staff(&actor.staff_id)?;
            if staff.and_then(|s| s.branch_code).as_deref() == Some(branch_code) {
                return Ok(());
            }
        }
        Err(PmsError::unauthorized(&actor.staff_id, format!("map accounts in branch {branch_code}")))
    }

    fn active_staff(&self, staff_id: &str) -> PmsResult<Staff> {
        match self.ctx.store.get_staff(staff_id)? {
            Some(staff) if staff.active => Ok(staff),
            Some(_) => Err(PmsError::validation(format!("staff {staff_id} is inactive"))),
            None => Err(PmsError::not_found("staff", staff_id)),
        }
    }

    /// Manual (re)assignment. Succeeds only while the account is still owned
    /// by `expected_owner`; unknown accounts are created in the new owner's
    /// branch.
    pub fn map_account(
        &self,
        actor: &Actor,
        account_number: &str,
        staff_id: &str,
        expected_owner: Option<&str>,
    ) -> PmsResult<Outcome<AccountMapping>> {
        let account_number = account_number.trim();
        if account_number.is_empty() {
            return Err(PmsError::validation("account_number is required"));
        }
        let owner = self.active_staff(staff_id)?;
        let owner_branch = owner
            .branch_code
            .clone()
            .ok_or_else(|| PmsError::validation(format!("staff {staff_id} has no branch")))?;
        let store = self.ctx.store;

        let mapping = store.with_transaction(|store| {
            let existing = store.get_account_mapping(account_number)?;
            let branch_code = existing
                .as_ref()
                .map(|m| m.branch_code.clone())
                .unwrap_or_else(|| owner_branch.clone());
            self.require_mapping_rights(actor, &branch_code)?;
            if branch_code != owner_branch {
                return Err(PmsError::validation(format!(
                    "staff {staff_id} does not work in branch {branch_code}"
                )));
            }
            if existing.is_none() {
                if expected_owner.is_some() {
                    return Err(PmsError::conflict(format!(
                        "account {account_number} has no owner"
                    )));
                }
                store.insert_account_mapping(&AccountMapping {
                    account_number: account_number.to_string(),
                    staff_id: None,
                    branch_code: branch_code.clone(),
                    current_balance: 0.0,
                    june_balance: 0.0,
                    last_transaction_date: None,
                    active_status: false,
                    status: AccountStatus::Active,
                    auto_balanced: false,
                })?;
            }
            if !store.assign_account_owner(account_number, expected_owner, staff_id, false)? {
                return Err(PmsError::conflict(format!(
                    "account {account_number} is no longer owned by {}",
                    expected_owner.unwrap_or("nobody")
                )));
            }
            store
                .get_account_mapping(account_number)?
                .ok_or_else(|| PmsError::not_found("account_mapping", account_number))
        })?;

        let event = AuditEvent::AccountMapped {
            account_number: account_number.to_string(),
            staff_id: staff_id.to_string(),
            previous_owner: expected_owner.map(str::to_string),
        };
        Ok(Outcome::single(mapping, event))
    }

    /// Hand an owned account to another staff member of the same branch.
    pub fn transfer_account(
        &self,
        actor: &Actor,
        account_number: &str,
        new_owner: &str,
    ) -> PmsResult<Outcome<AccountMapping>> {
        let store = self.ctx.store;
        let current = store
            .get_account_mapping(account_number)?
            .ok_or_else(|| PmsError::not_found("account_mapping", account_number))?;
        self.require_mapping_rights(actor, &current.branch_code)?;
        let from = current
            .staff_id
            .clone()
            .ok_or_else(|| PmsError::validation(format!("account {account_number} has no owner")))?;
        if from == new_owner {
            return Err(PmsError::validation(format!("account {account_number} already belongs to {new_owner}")));
        }
        let target = self.active_staff(new_owner)?;
        if target.branch_code.as_deref() != Some(current.branch_code.as_str()) {
            return Err(PmsError::validation(format!(
                "staff {new_owner} does not work in branch {}",
                current.branch_code
            )));
        }
        if !store.assign_account_owner(account_number, Some(&from), new_owner, false)? {
            return Err(PmsError::conflict(format!("account {account_number} changed owner concurrently")));
        }
        let mapping = store
            .get_account_mapping(account_number)?
            .ok_or_else(|| PmsError::not_found("account_mapping", account_number))?;
        let event = AuditEvent::AccountTransferred {
            account_number: account_number.to_string(),
            from,
            to: new_owner.to_string(),
        };
        Ok(Outcome::single(mapping, event))
    }

    /// Spread unowned qualifying accounts across the branch's MSOs, always
    /// to whoever currently holds the fewest (ties by staff id).
    pub fn auto_balance(&self, actor: &Actor, branch_code: &str) -> PmsResult<Outcome<usize>> {
        self.require_mapping_rights(actor, branch_code)?;
        let store = self.ctx.store;
        let min_balance = self.ctx.config.mapping.min_qualifying_balance;

        let assigned = store.with_transaction(|store| {
            let mut load: BTreeMap<String, i64> = BTreeMap::new();
            for mso in store
                .active_staff_in_branch(branch_code)?
                .into_iter()
                .filter(|s| s.position.is_mso())
            {
                let count = store.mapped_account_count(&mso.staff_id)?;
                load.insert(mso.staff_id, count);
            }
            if load.is_empty() {
                log::warn!("auto-balance in {branch_code}: no active MSOs");
                return Ok(0);
            }

            let mut assigned = 0;
            for account in store.unowned_accounts_in_branch(branch_code, min_balance)? {
                let Some((staff_id, _)) = load
                    .iter()
                    .min_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
                    .map(|(id, n)| (id.clone(), *n))
                else {
                    break;
                };
                if store.assign_account_owner(&account.account_number, None, &staff_id, true)? {
                    *load.entry(staff_id.clone()).or_default() += 1;
                    assigned += 1;
                    log::debug!("auto-balanced {} to {staff_id}", account.account_number);
                } else {
                    log::debug!("{} was claimed concurrently", account.account_number);
                }
            }
            Ok(assigned)
        })?;

        log::info!("auto-balance in {branch_code}: {assigned} accounts assigned");
        let event = AuditEvent::AccountsAutoBalanced {
            branch_code: branch_code.to_string(),
            assigned,
        };
        Ok(Outcome::single(assigned, event))
    }

    pub fn accounts_for_staff(&self, staff_id: &str) -> PmsResult<Vec<AccountMapping>> {
        self.ctx.store.accounts_for_staff(staff_id)
    }

    /// Accounts that count toward the staff member's deposit growth.
    pub fn qualifying_accounts_for_staff(&self, staff_id: &str) -> PmsResult<Vec<AccountMapping>> {
        let min_balance = self.ctx.config.mapping.min_qualifying_balance;
        Ok(self
            .ctx
            .store
            .accounts_for_staff(staff_id)?
            .into_iter()
            .filter(|m| m.qualifies(min_balance))
            .collect())
    }

    pub fn upsert_product_mapping(
        &self,
        actor: &Actor,
        product_name: &str,
        kpi_category: KpiCategory,
        active: bool,
    ) -> PmsResult<Outcome<ProductMapping>> {
        require_admin(actor, "manage product mappings")?;
        let product_name = product_name.trim();
        if product_name.is_empty() {
            return Err(PmsError::validation("product name is required"));
        }
        let mapping = ProductMapping {
            product_name: product_name.to_string(),
            kpi_category,
            active,
        };
        self.ctx.store.upsert_product_mapping(&mapping)?;
        let event = AuditEvent::ProductMappingSaved {
            product_name: mapping.product_name.clone(),
            kpi_category,
            active,
        };
        Ok(Outcome::single(mapping, event))
    }

    pub fn active_product_mappings(&self) -> PmsResult<Vec<ProductMapping>> {
        self.ctx.store.active_product_mappings()
    }
}
