//! Provider trait and core request/response types

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::query::{Filter, Pagination, Sort};

/// Backend row identifier
pub type Id = i64;

/// A named backend collection with a typed row shape
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Collection name on the backend (e.g. `"contacts"`)
    const RESOURCE: &'static str;

    fn id(&self) -> Id;
}

/// Parameters for a list query
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub filters: Vec<Filter>,
    pub sort: Option<Sort>,
    pub pagination: Option<Pagination>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paginate(mut self, page: u32, per_page: u32) -> Self {
        self.pagination = Some(Pagination::new(page, per_page));
        self
    }
}

/// A page of results plus the total match count when the backend reports one
#[derive(Debug, Clone)]
pub struct ListResult<R> {
    pub data: Vec<R>,
    pub total: Option<u64>,
}

impl<R> ListResult<R> {
    /// Total matches if known, otherwise the returned page size
    pub fn total_or_len(&self) -> u64 {
        self.total.unwrap_or(self.data.len() as u64)
    }
}

/// Asynchronous CRUD access to backend collections
///
/// Create and update payloads are JSON objects so partial patches stay
/// partial on the wire; reads come back as typed rows.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn get_list<R: Resource>(&self, params: ListParams) -> Result<ListResult<R>>;

    async fn get_one<R: Resource>(&self, id: Id) -> Result<R>;

    async fn get_many<R: Resource>(&self, ids: &[Id]) -> Result<Vec<R>>;

    /// List rows of `R` whose `target_field` references `target_id`
    async fn get_many_reference<R: Resource>(
        &self,
        target_field: &str,
        target_id: Id,
        params: ListParams,
    ) -> Result<ListResult<R>>;

    async fn create<R: Resource>(&self, data: Value) -> Result<R>;

    async fn update<R: Resource>(&self, id: Id, patch: Value) -> Result<R>;

    async fn delete<R: Resource>(&self, id: Id) -> Result<R>;
}
