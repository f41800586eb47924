//! In-memory provider
//!
//! Table-per-resource store with the same filter semantics as the PostgREST
//! provider. Backs the test suite; services stay generic over the provider
//! so everything above the HTTP layer runs offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;

use super::provider::{DataProvider, Id, ListParams, ListResult, Resource};
use super::query::{Filter, FilterOp, SortOrder};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Id, Value>,
    next_id: Id,
}

impl Table {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`DataProvider`] implementation
#[derive(Debug, Default)]
pub struct MemoryProvider {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored for a resource
    pub fn count<R: Resource>(&self) -> usize {
        let tables = self.tables.lock().expect("memory provider poisoned");
        tables.get(R::RESOURCE).map(|t| t.rows.len()).unwrap_or(0)
    }

    fn insert(&self, resource: &str, mut data: Value) -> Result<Value> {
        let obj = data
            .as_object_mut()
            .ok_or_else(|| anyhow!("create payload for '{}' must be a JSON object", resource))?;

        let mut tables = self.tables.lock().expect("memory provider poisoned");
        let table = tables.entry(resource.to_string()).or_default();

        // Honor an explicit id (seed data), otherwise assign the next one
        let id = match obj.get("id").and_then(Value::as_i64) {
            Some(given) => {
                table.next_id = table.next_id.max(given);
                given
            }
            None => table.allocate_id(),
        };
        obj.insert("id".to_string(), Value::from(id));

        table.rows.insert(id, data.clone());
        Ok(data)
    }
}

#[async_trait]
impl DataProvider for MemoryProvider {
    async fn get_list<R: Resource>(&self, params: ListParams) -> Result<ListResult<R>> {
        let tables = self.tables.lock().expect("memory provider poisoned");
        let mut rows: Vec<Value> = tables
            .get(R::RESOURCE)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| params.filters.iter().all(|f| matches_filter(f, row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(sort) = &params.sort {
            rows.sort_by(|a, b| {
                let ord = compare_fields(a.get(&sort.field), b.get(&sort.field));
                match sort.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let total = rows.len() as u64;
        if let Some(page) = &params.pagination {
            let start = (page.offset() as usize).min(rows.len());
            let end = (start + page.per_page as usize).min(rows.len());
            rows = rows[start..end].to_vec();
        }

        let data = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<R>, _>>()
            .with_context(|| format!("Failed to deserialize '{}' rows", R::RESOURCE))?;

        Ok(ListResult {
            data,
            total: Some(total),
        })
    }

    async fn get_one<R: Resource>(&self, id: Id) -> Result<R> {
        let tables = self.tables.lock().expect("memory provider poisoned");
        let row = tables
            .get(R::RESOURCE)
            .and_then(|t| t.rows.get(&id))
            .cloned()
            .ok_or_else(|| anyhow!("{} {} not found", R::RESOURCE, id))?;
        serde_json::from_value(row)
            .with_context(|| format!("Failed to deserialize {} {}", R::RESOURCE, id))
    }

    async fn get_many<R: Resource>(&self, ids: &[Id]) -> Result<Vec<R>> {
        let tables = self.tables.lock().expect("memory provider poisoned");
        let mut out = Vec::new();
        if let Some(table) = tables.get(R::RESOURCE) {
            for id in ids {
                if let Some(row) = table.rows.get(id) {
                    out.push(serde_json::from_value(row.clone()).with_context(|| {
                        format!("Failed to deserialize {} {}", R::RESOURCE, id)
                    })?);
                }
            }
        }
        Ok(out)
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
        let stored = self.insert(R::RESOURCE, data)?;
        serde_json::from_value(stored)
            .with_context(|| format!("Failed to deserialize created {}", R::RESOURCE))
    }

    async fn update<R: Resource>(&self, id: Id, patch: Value) -> Result<R> {
        let patch_obj = patch
            .as_object()
            .ok_or_else(|| anyhow!("update payload for '{}' must be a JSON object", R::RESOURCE))?;

        let mut tables = self.tables.lock().expect("memory provider poisoned");
        let table = tables
            .get_mut(R::RESOURCE)
            .ok_or_else(|| anyhow!("{} {} not found", R::RESOURCE, id))?;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| anyhow!("{} {} not found", R::RESOURCE, id))?;
        let row_obj = row
            .as_object_mut()
            .ok_or_else(|| anyhow!("{} {} is not an object", R::RESOURCE, id))?;

        for (key, value) in patch_obj {
            if key == "id" {
                continue;
            }
            row_obj.insert(key.clone(), value.clone());
        }

        serde_json::from_value(row.clone())
            .with_context(|| format!("Failed to deserialize updated {} {}", R::RESOURCE, id))
    }

    async fn delete<R: Resource>(&self, id: Id) -> Result<R> {
        let mut tables = self.tables.lock().expect("memory provider poisoned");
        let row = tables
            .get_mut(R::RESOURCE)
            .and_then(|t| t.rows.remove(&id))
            .ok_or_else(|| anyhow!("{} {} not found", R::RESOURCE, id))?;
        serde_json::from_value(row)
            .with_context(|| format!("Failed to deserialize deleted {} {}", R::RESOURCE, id))
    }
}

/// Evaluate one filter against a stored row
fn matches_filter(filter: &Filter, row: &Value) -> bool {
    let field = row.get(&filter.field);
    match filter.op {
        FilterOp::Eq => field == Some(&filter.value),
        FilterOp::Neq => field != Some(&filter.value),
        FilterOp::Gt => compare_numeric(field, &filter.value).is_some_and(|o| o.is_gt()),
        FilterOp::Gte => compare_numeric(field, &filter.value).is_some_and(|o| o.is_ge()),
        FilterOp::Lt => compare_numeric(field, &filter.value).is_some_and(|o| o.is_lt()),
        FilterOp::Lte => compare_numeric(field, &filter.value).is_some_and(|o| o.is_le()),
        FilterOp::Contains => {
            let Some(Value::Array(items)) = field else {
                return false;
            };
            match &filter.value {
                Value::Array(wanted) => wanted.iter().all(|w| items.contains(w)),
                single => items.contains(single),
            }
        }
        FilterOp::FullText | FilterOp::Ilike => {
            let Some(Value::String(haystack)) = field else {
                return false;
            };
            let needle = match &filter.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }
        FilterOp::Is => match &filter.value {
            Value::Null => field.is_none() || field == Some(&Value::Null),
            other => field == Some(other),
        },
        FilterOp::In => match &filter.value {
            Value::Array(allowed) => field.is_some_and(|v| allowed.contains(v)),
            single => field == Some(single),
        },
    }
}

fn compare_numeric(field: Option<&Value>, value: &Value) -> Option<std::cmp::Ordering> {
    let a = field?.as_f64()?;
    let b = value.as_f64()?;
    a.partial_cmp(&b)
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(std::cmp::Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        _ => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::query::Sort;
    use crate::models::Tag;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let provider = MemoryProvider::new();
        let a: Tag = provider
            .create(json!({"name": "vip", "color": "#eddcd2"}))
            .await
            .unwrap();
        let b: Tag = provider
            .create(json!({"name": "lead", "color": "#fde2e4"}))
            .await
            .unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_create_honors_explicit_id() {
        let provider = MemoryProvider::new();
        let seeded: Tag = provider
            .create(json!({"id": 40, "name": "vip", "color": "#eddcd2"}))
            .await
            .unwrap();
        assert_eq!(seeded.id, 40);

        // Subsequent auto-assigned ids must not collide
        let next: Tag = provider
            .create(json!({"name": "lead", "color": "#fde2e4"}))
            .await
            .unwrap();
        assert_eq!(next.id, 41);
    }

    #[tokio::test]
    async fn test_update_is_a_shallow_patch() {
        let provider = MemoryProvider::new();
        let tag: Tag = provider
            .create(json!({"name": "vip", "color": "#eddcd2"}))
            .await
            .unwrap();
        let updated: Tag = provider
            .update::<Tag>(tag.id, json!({"color": "#fad2e1"}))
            .await
            .unwrap();
        assert_eq!(updated.name, "vip");
        assert_eq!(updated.color, "#fad2e1");
    }

    #[tokio::test]
    async fn test_delete_returns_removed_row() {
        let provider = MemoryProvider::new();
        let tag: Tag = provider
            .create(json!({"name": "vip", "color": "#eddcd2"}))
            .await
            .unwrap();
        let removed: Tag = provider.delete::<Tag>(tag.id).await.unwrap();
        assert_eq!(removed.id, tag.id);
        assert!(provider.get_one::<Tag>(tag.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let provider = MemoryProvider::new();
        for (name, color) in [("warm", "#a"), ("hot", "#b"), ("cold", "#a")] {
            let _: Tag = provider
                .create(json!({"name": name, "color": color}))
                .await
                .unwrap();
        }

        let result: ListResult<Tag> = provider
            .get_list(
                ListParams::new()
                    .filter(Filter::eq("color", json!("#a")))
                    .sort(Sort::asc("name"))
                    .paginate(1, 1),
            )
            .await
            .unwrap();

        assert_eq!(result.total, Some(2));
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].name, "cold");
    }

    #[tokio::test]
    async fn test_contains_filter_on_array_field() {
        let provider = MemoryProvider::new();
        let _: crate::models::Deal = provider
            .create(json!({
                "name": "Big deal", "stage": "won", "index": 0,
                "contact_ids": [7, 9], "amount": 100.0
            }))
            .await
            .unwrap();

        let hit: ListResult<crate::models::Deal> = provider
            .get_list(ListParams::new().filter(Filter::contains("contact_ids", json!([7]))))
            .await
            .unwrap();
        assert_eq!(hit.data.len(), 1);

        let miss: ListResult<crate::models::Deal> = provider
            .get_list(ListParams::new().filter(Filter::contains("contact_ids", json!([8]))))
            .await
            .unwrap();
        assert!(miss.data.is_empty());
    }

    #[tokio::test]
    async fn test_is_null_matches_missing_and_null() {
        let provider = MemoryProvider::new();
        let _: crate::models::Deal = provider
            .create(json!({"name": "Open", "stage": "won", "index": 0}))
            .await
            .unwrap();
        let _: crate::models::Deal = provider
            .create(json!({"name": "Archived", "stage": "won", "index": 1,
                           "archived_at": "2026-01-10T00:00:00Z"}))
            .await
            .unwrap();

        let open: ListResult<crate::models::Deal> = provider
            .get_list(ListParams::new().filter(Filter::is_null("archived_at")))
            .await
            .unwrap();
        assert_eq!(open.data.len(), 1);
        assert_eq!(open.data[0].name, "Open");
    }
}
