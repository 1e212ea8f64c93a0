//! Shared plumbing for the engine subsystems.
//!
//! RULE: Subsystems never persist audit events themselves. Every mutating
//! operation returns its events in an `Outcome`; the engine writes them to
//! the event log with the acting staff id.

use crate::{config::PmsConfig, error::{PmsError, PmsResult}, event::AuditEvent, position::Actor, store::PmsStore};

/// Borrowed store and configuration handed to each subsystem.
#[derive(Clone, Copy)]
pub struct Ctx<'a> {
    pub store: &'a PmsStore,
    pub config: &'a PmsConfig,
}

impl<'a> Ctx<'a> {
    pub fn new(store: &'a PmsStore, config: &'a PmsConfig) -> Self {
        Self { store, config }
    }
}

/// Result of a mutating operation plus the audit events it produced.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<AuditEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, events: Vec<AuditEvent>) -> Self {
        Self { value, events }
    }

    pub fn single(value: T, event: AuditEvent) -> Self {
        Self { value, events: vec![event] }
    }
}

/// Administrative operations (plans, config, baselines).
pub fn require_admin(actor: &Actor, action: &str) -> PmsResult<()> {
    if actor.position.can_administer() {
        Ok(())
    } else {
        Err(PmsError::unauthorized(&actor.staff_id, action))
    }
}
