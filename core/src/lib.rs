//! pms-core: staff performance management for a branch network.
//!
//! Plan cascade, task approvals, CBS reconciliation, KPI scoring and
//! performance aggregation over a SQLite store. Drive it through
//! [`engine::PmsEngine`].

pub mod approval;
pub mod baseline_subsystem;
pub mod behavioral_subsystem;
pub mod category;
pub mod cbs_extract;
pub mod cbs_reconciliation_subsystem;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod kpi_scoring_subsystem;
pub mod mapping_subsystem;
pub mod model;
pub mod performance_subsystem;
pub mod period;
pub mod plan_cascade_subsystem;
pub mod position;
pub mod roster_subsystem;
pub mod store;
pub mod subsystem;
pub mod task_subsystem;
pub mod types;
