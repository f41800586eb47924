//! PostgREST provider
//!
//! Translates [`ListParams`] to PostgREST query strings (`eq.`, `cs.{..}`,
//! `fts.`, `order=`, `limit`/`offset`) and the CRUD verbs to the matching
//! HTTP methods. Mutations ask for `return=representation` so every call
//! hands back the resulting row.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::provider::{DataProvider, Id, ListParams, ListResult, Resource};
use super::query::Filter;

/// reqwest-backed [`DataProvider`] for a PostgREST endpoint
#[derive(Debug, Clone)]
pub struct PostgrestProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PostgrestProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: None,
        }
    }

    /// Attach an api key, sent as both `apikey` and bearer headers
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).context("Invalid api key header value")?,
            );
            headers.insert(
                reqwest::header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .context("Invalid api key header value")?,
            );
        }
        Ok(headers)
    }

    fn query_string(params: &ListParams) -> String {
        let mut pairs: Vec<String> = Vec::new();
        for filter in &params.filters {
            let (key, value) = filter.to_query_pair();
            pairs.push(format!(
                "{}={}",
                urlencoding::encode(&key),
                urlencoding::encode(&value)
            ));
        }
        if let Some(sort) = &params.sort {
            pairs.push(format!(
                "order={}.{}",
                urlencoding::encode(&sort.field),
                sort.order.token()
            ));
        }
        if let Some(page) = &params.pagination {
            pairs.push(format!("limit={}", page.per_page));
            pairs.push(format!("offset={}", page.offset()));
        }
        pairs.join("&")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        bail!("Backend returned {}: {}", status, body)
    }

    /// Parse the total from a `Content-Range` header (`0-24/3573`)
    fn parse_total(headers: &HeaderMap) -> Option<u64> {
        let range = headers.get("content-range")?.to_str().ok()?;
        let (_, total) = range.rsplit_once('/')?;
        total.parse().ok()
    }

    /// Mutations return a one-row representation array
    fn single_row<R: Resource>(mut rows: Vec<R>, verb: &str) -> Result<R> {
        match rows.pop() {
            Some(row) => Ok(row),
            None => bail!("Backend returned no row for {} on '{}'", verb, R::RESOURCE),
        }
    }
}

#[async_trait]
impl DataProvider for PostgrestProvider {
    async fn get_list<R: Resource>(&self, params: ListParams) -> Result<ListResult<R>> {
        let query = Self::query_string(&params);
        let url = if query.is_empty() {
            self.endpoint(R::RESOURCE)
        } else {
            format!("{}?{}", self.endpoint(R::RESOURCE), query)
        };
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .header("Prefer", "count=exact")
            .send()
            .await
            .with_context(|| format!("Failed to list '{}'", R::RESOURCE))?;
        let response = Self::check(response).await?;

        let total = Self::parse_total(response.headers());
        let data: Vec<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode '{}' list", R::RESOURCE))?;
        Ok(ListResult { data, total })
    }

    async fn get_one<R: Resource>(&self, id: Id) -> Result<R> {
        let url = format!("{}?id=eq.{}", self.endpoint(R::RESOURCE), id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} {}", R::RESOURCE, id))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode {} {}", R::RESOURCE, id))
    }

    async fn get_many<R: Resource>(&self, ids: &[Id]) -> Result<Vec<R>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let url = format!(
            "{}?id=in.({})",
            self.endpoint(R::RESOURCE),
            list.join(",")
        );
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to fetch '{}' by ids", R::RESOURCE))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode '{}' rows", R::RESOURCE))
    }

    async fn get_many_reference<R: Resource>(
        &self,
        target_field: &str,
        target_id: Id,
        params: ListParams,
    ) -> Result<ListResult<R>> {
        let params = params.filter(Filter::eq(target_field, Value::from(target_id)));
        self.get_list(params).await
    }

    async fn create<R: Resource>(&self, data: Value) -> Result<R> {
        let url = self.endpoint(R::RESOURCE);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .header("Prefer", "return=representation")
            .json(&data)
            .send()
            .await
            .with_context(|| format!("Failed to create '{}' row", R::RESOURCE))?;
        let response = Self::check(response).await?;
        let rows: Vec<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode created '{}' row", R::RESOURCE))?;
        Self::single_row(rows, "create")
    }

    async fn update<R: Resource>(&self, id: Id, patch: Value) -> Result<R> {
        let url = format!("{}?id=eq.{}", self.endpoint(R::RESOURCE), id);
        debug!("PATCH {}", url);

        let response = self
            .client
            .patch(&url)
            .headers(self.auth_headers()?)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .with_context(|| format!("Failed to update {} {}", R::RESOURCE, id))?;
        let response = Self::check(response).await?;
        let rows: Vec<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode updated {} {}", R::RESOURCE, id))?;
        Self::single_row(rows, "update")
    }

    async fn delete<R: Resource>(&self, id: Id) -> Result<R> {
        let url = format!("{}?id=eq.{}", self.endpoint(R::RESOURCE), id);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .headers(self.auth_headers()?)
            .header("Prefer", "return=representation")
            .send()
            .await
            .with_context(|| format!("Failed to delete {} {}", R::RESOURCE, id))?;
        let response = Self::check(response).await?;
        let rows: Vec<R> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode deleted {} {}", R::RESOURCE, id))?;
        Self::single_row(rows, "delete")
    }
}
