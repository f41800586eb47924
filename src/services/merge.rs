//! Contact merge
//!
//! Merging folds a "loser" contact into a "winner": dependent tasks, notes
//! and deals are reassigned, array fields are unioned onto the winner, and
//! the loser row is deleted last. The operation is irreversible; callers are
//! expected to confirm against [`MergeService::preview`] first.
//!
//! The mutation batch runs concurrently with no rollback: the delete step
//! only runs once the whole batch has resolved, but a partial failure inside
//! the batch leaves the applied reassignments in place.

use anyhow::{Context, Result, bail};
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use log::{debug, info};
use serde_json::{Map, Value, json};

use crate::api::{DataProvider, Filter, Id, ListParams};
use crate::models::{Contact, ContactNote, Deal, Task};

/// Fetch bound for dependent-record lists
pub const RELATED_FETCH_LIMIT: u32 = 1000;

/// Dependent-record counts shown before a merge is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeImpact {
    pub tasks: u64,
    pub notes: u64,
    pub deals: u64,
}

impl MergeImpact {
    pub fn total(&self) -> u64 {
        self.tasks + self.notes + self.deals
    }
}

/// Summary of an executed merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub winner_id: Id,
    pub loser_id: Id,
    pub reassigned: MergeImpact,
}

/// Build the winner's field patch from both contacts
///
/// Winner's non-null scalars win, loser fills the gaps; email/phone entries
/// are unioned by their value key with the winner's entry winning ties; tags
/// are unioned preserving winner order; `last_seen` takes the later and
/// `first_seen` the earlier timestamp. Fields already correct on the winner
/// are left out of the patch.
pub fn merge_contact_fields(winner: &Contact, loser: &Contact) -> Value {
    let mut patch = Map::new();

    if winner.first_name.is_empty() && !loser.first_name.is_empty() {
        patch.insert("first_name".to_string(), json!(loser.first_name));
    }
    if winner.last_name.is_empty() && !loser.last_name.is_empty() {
        patch.insert("last_name".to_string(), json!(loser.last_name));
    }
    fill_scalar(&mut patch, "gender", &winner.gender, &loser.gender);
    fill_scalar(&mut patch, "title", &winner.title, &loser.title);
    fill_scalar(&mut patch, "background", &winner.background, &loser.background);
    fill_scalar(&mut patch, "avatar", &winner.avatar, &loser.avatar);
    fill_scalar(&mut patch, "status", &winner.status, &loser.status);
    fill_scalar(
        &mut patch,
        "linkedin_url",
        &winner.linkedin_url,
        &loser.linkedin_url,
    );
    if winner.company_id.is_none() && loser.company_id.is_some() {
        patch.insert("company_id".to_string(), json!(loser.company_id));
    }
    if winner.sales_id.is_none() && loser.sales_id.is_some() {
        patch.insert("sales_id".to_string(), json!(loser.sales_id));
    }

    let emails = union_by_key(
        &winner.email_jsonb,
        &loser.email_jsonb,
        |e| e.email.clone(),
    );
    if emails.len() != winner.email_jsonb.len() {
        patch.insert("email_jsonb".to_string(), json!(emails));
    }
    let phones = union_by_key(
        &winner.phone_jsonb,
        &loser.phone_jsonb,
        |p| p.number.clone(),
    );
    if phones.len() != winner.phone_jsonb.len() {
        patch.insert("phone_jsonb".to_string(), json!(phones));
    }

    let mut tags = winner.tags.clone();
    for tag in &loser.tags {
        if !tags.contains(tag) {
            tags.push(*tag);
        }
    }
    if tags.len() != winner.tags.len() {
        patch.insert("tags".to_string(), json!(tags));
    }

    match (winner.last_seen, loser.last_seen) {
        (Some(w), Some(l)) if l > w => {
            patch.insert("last_seen".to_string(), json!(l));
        }
        (None, Some(l)) => {
            patch.insert("last_seen".to_string(), json!(l));
        }
        _ => {}
    }
    match (winner.first_seen, loser.first_seen) {
        (Some(w), Some(l)) if l < w => {
            patch.insert("first_seen".to_string(), json!(l));
        }
        (None, Some(l)) => {
            patch.insert("first_seen".to_string(), json!(l));
        }
        _ => {}
    }

    Value::Object(patch)
}

fn fill_scalar(
    patch: &mut Map<String, Value>,
    field: &str,
    winner: &Option<String>,
    loser: &Option<String>,
) {
    if winner.is_none()
        && let Some(value) = loser
    {
        patch.insert(field.to_string(), json!(value));
    }
}

/// Union two entry lists keyed by `key`; `primary` entries win collisions
/// and keep their order
fn union_by_key<T: Clone, K: Fn(&T) -> String>(primary: &[T], secondary: &[T], key: K) -> Vec<T> {
    let mut out: Vec<T> = primary.to_vec();
    for entry in secondary {
        if !out.iter().any(|e| key(e) == key(entry)) {
            out.push(entry.clone());
        }
    }
    out
}

/// Replace `from` with `to` in a reference list, deduplicating while
/// preserving order
fn reassign_ids(ids: &[Id], from: Id, to: Id) -> Vec<Id> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let id = if *id == from { to } else { *id };
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Contact-merge orchestrator
pub struct MergeService<'a, P> {
    provider: &'a P,
}

impl<'a, P: DataProvider> MergeService<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Count the records a merge would touch, without mutating anything
    pub async fn preview(&self, loser_id: Id) -> Result<MergeImpact> {
        let tasks = self
            .provider
            .get_list::<Task>(
                ListParams::new()
                    .filter(Filter::eq("contact_id", json!(loser_id)))
                    .paginate(1, 1),
            )
            .await
            .context("Failed to count tasks")?;
        let notes = self
            .provider
            .get_list::<ContactNote>(
                ListParams::new()
                    .filter(Filter::eq("contact_id", json!(loser_id)))
                    .paginate(1, 1),
            )
            .await
            .context("Failed to count notes")?;
        let deals = self
            .provider
            .get_list::<Deal>(
                ListParams::new()
                    .filter(Filter::contains("contact_ids", json!([loser_id])))
                    .paginate(1, 1),
            )
            .await
            .context("Failed to count deals")?;

        Ok(MergeImpact {
            tasks: tasks.total_or_len(),
            notes: notes.total_or_len(),
            deals: deals.total_or_len(),
        })
    }

    /// Merge `loser_id` into `winner_id` and delete the loser
    pub async fn merge(&self, loser_id: Id, winner_id: Id) -> Result<MergeOutcome> {
        if loser_id == winner_id {
            bail!("Cannot merge a contact into itself");
        }

        // Fetch both fresh; abort before any mutation if either is missing
        let loser: Contact = self
            .provider
            .get_one(loser_id)
            .await
            .context("Failed to fetch contact to merge away")?;
        let winner: Contact = self
            .provider
            .get_one(winner_id)
            .await
            .context("Failed to fetch contact to keep")?;

        let tasks = self.related::<Task>("contact_id", loser_id).await?;
        let notes = self.related::<ContactNote>("contact_id", loser_id).await?;
        let deals = self
            .provider
            .get_list::<Deal>(
                ListParams::new()
                    .filter(Filter::contains("contact_ids", json!([loser_id])))
                    .paginate(1, RELATED_FETCH_LIMIT),
            )
            .await
            .context("Failed to fetch deals referencing contact")?
            .data;

        let reassigned = MergeImpact {
            tasks: tasks.len() as u64,
            notes: notes.len() as u64,
            deals: deals.len() as u64,
        };
        debug!(
            "Merging contact {} into {}: {} tasks, {} notes, {} deals",
            loser_id, winner_id, reassigned.tasks, reassigned.notes, reassigned.deals
        );

        let mut mutations: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        for task in &tasks {
            let patch = json!({"contact_id": winner_id});
            mutations.push(
                self.provider
                    .update::<Task>(task.id, patch)
                    .map(|r| r.map(|_| ()))
                    .boxed(),
            );
        }
        for note in &notes {
            let patch = json!({"contact_id": winner_id});
            mutations.push(
                self.provider
                    .update::<ContactNote>(note.id, patch)
                    .map(|r| r.map(|_| ()))
                    .boxed(),
            );
        }
        for deal in &deals {
            let contact_ids = reassign_ids(&deal.contact_ids, loser_id, winner_id);
            mutations.push(
                self.provider
                    .update::<Deal>(deal.id, json!({"contact_ids": contact_ids}))
                    .map(|r| r.map(|_| ()))
                    .boxed(),
            );
        }
        let patch = merge_contact_fields(&winner, &loser);
        if patch.as_object().is_some_and(|o| !o.is_empty()) {
            mutations.push(
                self.provider
                    .update::<Contact>(winner_id, patch)
                    .map(|r| r.map(|_| ()))
                    .boxed(),
            );
        }

        // All-or-nothing boundary: the loser is only deleted once every
        // reassignment and the winner update have resolved
        try_join_all(mutations)
            .await
            .context("Merge reassignment failed; loser contact was NOT deleted")?;
        self.provider
            .delete::<Contact>(loser_id)
            .await
            .context("Failed to delete merged contact")?;

        info!(
            "Merged contact {} into {} ({} records reassigned)",
            loser_id,
            winner_id,
            reassigned.total()
        );
        Ok(MergeOutcome {
            winner_id,
            loser_id,
            reassigned,
        })
    }

    async fn related<R: crate::api::Resource>(&self, field: &str, id: Id) -> Result<Vec<R>> {
        Ok(self
            .provider
            .get_many_reference::<R>(
                field,
                id,
                ListParams::new().paginate(1, RELATED_FETCH_LIMIT),
            )
            .await
            .with_context(|| format!("Failed to fetch {} referencing contact", R::RESOURCE))?
            .data)
    }
}
