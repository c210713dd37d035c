//! Payroll Engine library crate.
//!
//! This crate turns a period's gross pay into net pay through statutory
//! social insurance and housing fund contributions and cumulative
//! (year-to-date) income tax withholding.  The computation modules are
//! pure and synchronous; callers persist the returned year state.
//! External applications may call `engine::compute_payroll` directly
//! or embed the HTTP API via `api::build_router`.

pub mod error;
pub mod models;
pub mod contribution;
pub mod tax;
pub mod withholding;
pub mod policy;
pub mod engine;
pub mod store;
pub mod config;
pub mod api;

pub use engine::{compute_payroll, compute_single_period, run_payroll};
pub use error::PayrollError;
pub use policy::PayrollPolicy;
pub use withholding::{EmployeeTaxYearState, YearPhase};
