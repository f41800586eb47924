//! Data-access layer
//!
//! Exposes the seven CRUD verbs the rest of the crate is written against:
//! `get_list`, `get_one`, `get_many`, `get_many_reference`, `create`,
//! `update`, `delete`. Resources are dispatched through the [`Resource`]
//! trait rather than caller-supplied collection names, so a typo in a
//! resource name is a compile error instead of a 404.

pub mod memory;
pub mod postgrest;
pub mod provider;
pub mod query;

pub use memory::MemoryProvider;
pub use postgrest::PostgrestProvider;
pub use provider::{DataProvider, Id, ListParams, ListResult, Resource};
pub use query::{Filter, FilterOp, Pagination, Sort, SortOrder};
