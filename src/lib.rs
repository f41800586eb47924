//! Atrium CRM orchestration library
//!
//! Business-logic core of a PostgREST-backed CRM: a typed data-access layer,
//! pipeline stage reordering, contact merging, bulk JSON/CSV import and
//! vCard/CSV export. The `atrium-crm` binary wraps these services in a CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod export;
pub mod import;
pub mod models;
pub mod services;

pub use api::{DataProvider, Filter, Id, ListParams, ListResult, Resource};
pub use config::CrmConfig;
