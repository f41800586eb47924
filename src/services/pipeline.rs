//! Pipeline stage reordering
//!
//! Moving a deal on the board touches every deal whose index shifts, so the
//! planner works from the complete, unfiltered record set of each affected
//! stage; a filtered board view must never corrupt the index of records
//! outside the filter. Planning is pure ([`plan_move`]); the service fetches
//! fresh stage lists, plans, and issues the whole update batch concurrently.
//!
//! There is no compensating rollback: a failed sibling update leaves the
//! others applied and the next stage fetch reveals the true state.

use anyhow::{Context, Result, bail};
use futures::future::try_join_all;
use log::debug;
use serde_json::{Map, Value, json};

use crate::api::{DataProvider, Filter, Id, ListParams, Sort};
use crate::config::CrmConfig;
use crate::models::Deal;

/// Per-stage fetch bound; a stage with more live deals than this cannot be
/// reordered safely and the move is refused
pub const STAGE_FETCH_LIMIT: u32 = 100;

/// One index (and optionally stage) write for a single deal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexUpdate {
    pub id: Id,
    /// Set only for the moved record on a cross-stage move
    pub stage: Option<String>,
    pub index: i64,
}

impl IndexUpdate {
    fn shift(id: Id, index: i64) -> Self {
        Self {
            id,
            stage: None,
            index,
        }
    }

    /// Partial update payload for this write
    pub fn to_patch(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("index".to_string(), json!(self.index));
        if let Some(stage) = &self.stage {
            obj.insert("stage".to_string(), json!(stage));
        }
        Value::Object(obj)
    }
}

/// Compute the minimal set of index writes for one move
///
/// `source` is the full non-archived list of the deal's current stage
/// (containing the deal itself); `dest` is the full list of the destination
/// stage, ignored when the stages match. `to_index` of `None` means append;
/// any destination index is clamped into the valid range.
pub fn plan_move(
    deal: &Deal,
    source: &[Deal],
    dest: &[Deal],
    to_stage: &str,
    to_index: Option<i64>,
) -> Vec<IndexUpdate> {
    if deal.stage == to_stage {
        plan_same_stage(deal, source, to_index)
    } else {
        plan_cross_stage(deal, source, dest, to_stage, to_index)
    }
}

fn plan_same_stage(deal: &Deal, source: &[Deal], to_index: Option<i64>) -> Vec<IndexUpdate> {
    let last = source.len() as i64 - 1;
    let from = deal.index;
    let to = to_index.unwrap_or(last).clamp(0, last.max(0));
    if to == from {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for other in source.iter().filter(|d| d.id != deal.id) {
        if to < from && other.index >= to && other.index < from {
            updates.push(IndexUpdate::shift(other.id, other.index + 1));
        } else if to > from && other.index > from && other.index <= to {
            updates.push(IndexUpdate::shift(other.id, other.index - 1));
        }
    }
    updates.push(IndexUpdate::shift(deal.id, to));
    updates
}

fn plan_cross_stage(
    deal: &Deal,
    source: &[Deal],
    dest: &[Deal],
    to_stage: &str,
    to_index: Option<i64>,
) -> Vec<IndexUpdate> {
    let len = dest.len() as i64;
    let to = to_index.unwrap_or(len).clamp(0, len);

    let mut updates = Vec::new();
    // Close the gap the deal leaves behind
    for other in source.iter().filter(|d| d.id != deal.id) {
        if other.index > deal.index {
            updates.push(IndexUpdate::shift(other.id, other.index - 1));
        }
    }
    // Open a slot in the destination stage
    for other in dest.iter().filter(|d| d.id != deal.id) {
        if other.index >= to {
            updates.push(IndexUpdate::shift(other.id, other.index + 1));
        }
    }
    updates.push(IndexUpdate {
        id: deal.id,
        stage: Some(to_stage.to_string()),
        index: to,
    });
    updates
}

/// Stage-reorder orchestrator
pub struct PipelineService<'a, P> {
    provider: &'a P,
    config: &'a CrmConfig,
}

impl<'a, P: DataProvider> PipelineService<'a, P> {
    pub fn new(provider: &'a P, config: &'a CrmConfig) -> Self {
        Self { provider, config }
    }

    /// Move a deal within or across stages
    ///
    /// Returns the updates that were issued so the caller can reconcile its
    /// own view of the board.
    pub async fn move_deal(
        &self,
        deal_id: Id,
        to_stage: &str,
        to_index: Option<i64>,
    ) -> Result<Vec<IndexUpdate>> {
        if !self.config.is_deal_stage(to_stage) {
            bail!(
                "Unknown stage '{}' (configured stages: {})",
                to_stage,
                self.config.stage_values().join(", ")
            );
        }

        let deal: Deal = self
            .provider
            .get_one(deal_id)
            .await
            .context("Failed to fetch deal to move")?;
        if deal.is_archived() {
            bail!("Deal {} is archived and cannot be moved", deal_id);
        }

        let source = self.stage_deals(&deal.stage).await?;
        let dest = if deal.stage == to_stage {
            Vec::new()
        } else {
            self.stage_deals(to_stage).await?
        };

        let updates = plan_move(&deal, &source, &dest, to_stage, to_index);
        debug!(
            "Moving deal {} from {}[{}] to {}: {} index writes",
            deal_id,
            deal.stage,
            deal.index,
            to_stage,
            updates.len()
        );

        self.apply(&updates).await?;
        Ok(updates)
    }

    /// Soft-delete a deal and close the index gap it leaves in its stage
    pub async fn archive_deal(&self, deal_id: Id) -> Result<()> {
        let deal: Deal = self
            .provider
            .get_one(deal_id)
            .await
            .context("Failed to fetch deal to archive")?;
        if deal.is_archived() {
            bail!("Deal {} is already archived", deal_id);
        }

        let stage = self.stage_deals(&deal.stage).await?;
        let updates: Vec<IndexUpdate> = stage
            .iter()
            .filter(|d| d.id != deal.id && d.index > deal.index)
            .map(|d| IndexUpdate::shift(d.id, d.index - 1))
            .collect();
        debug!(
            "Archiving deal {}: shifting {} records in '{}'",
            deal_id,
            updates.len(),
            deal.stage
        );

        let archive = self
            .provider
            .update::<Deal>(deal_id, json!({"archived_at": chrono::Utc::now()}));
        let shifts = self.apply_inner(updates);
        futures::try_join!(archive, shifts)?;
        Ok(())
    }

    /// Restore an archived deal at the end of its stage
    pub async fn unarchive_deal(&self, deal_id: Id) -> Result<()> {
        let deal: Deal = self
            .provider
            .get_one(deal_id)
            .await
            .context("Failed to fetch deal to unarchive")?;
        if !deal.is_archived() {
            bail!("Deal {} is not archived", deal_id);
        }

        let stage_len = self.stage_deals(&deal.stage).await?.len() as i64;
        self.provider
            .update::<Deal>(
                deal_id,
                json!({"archived_at": Value::Null, "index": stage_len}),
            )
            .await
            .context("Failed to unarchive deal")?;
        Ok(())
    }

    /// Complete, unfiltered non-archived list of one stage, index ascending
    async fn stage_deals(&self, stage: &str) -> Result<Vec<Deal>> {
        let result = self
            .provider
            .get_list::<Deal>(
                ListParams::new()
                    .filter(Filter::eq("stage", json!(stage)))
                    .filter(Filter::is_null("archived_at"))
                    .sort(Sort::asc("index"))
                    .paginate(1, STAGE_FETCH_LIMIT),
            )
            .await
            .with_context(|| format!("Failed to fetch deals for stage '{}'", stage))?;

        if result.total_or_len() > STAGE_FETCH_LIMIT as u64 {
            bail!(
                "Stage '{}' holds more than {} deals; refusing to reorder a truncated list",
                stage,
                STAGE_FETCH_LIMIT
            );
        }
        Ok(result.data)
    }

    async fn apply(&self, updates: &[IndexUpdate]) -> Result<()> {
        self.apply_inner(updates.to_vec()).await
    }

    /// Issue all writes of one move as a single concurrent batch
    async fn apply_inner(&self, updates: Vec<IndexUpdate>) -> Result<()> {
        try_join_all(
            updates
                .iter()
                .map(|u| self.provider.update::<Deal>(u.id, u.to_patch())),
        )
        .await
        .context("One or more index updates failed; refetch the board to see applied state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryProvider;

    fn deal(id: Id, stage: &str, index: i64) -> Deal {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("deal-{}", id),
            "stage": stage,
            "index": index,
        }))
        .unwrap()
    }

    fn stage(stage_name: &str, ids: &[Id]) -> Vec<Deal> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| deal(*id, stage_name, i as i64))
            .collect()
    }

    async fn seed_stage(provider: &MemoryProvider, stage_name: &str, ids: &[Id]) {
        for (i, id) in ids.iter().enumerate() {
            let _: Deal = provider
                .create(json!({
                    "id": id,
                    "name": format!("deal-{}", id),
                    "stage": stage_name,
                    "index": i as i64,
                }))
                .await
                .unwrap();
        }
    }

    async fn stage_ids_in_order(provider: &MemoryProvider, stage_name: &str) -> Vec<Id> {
        let result = provider
            .get_list::<Deal>(
                ListParams::new()
                    .filter(Filter::eq("stage", json!(stage_name)))
                    .filter(Filter::is_null("archived_at"))
                    .sort(Sort::asc("index")),
            )
            .await
            .unwrap();
        // Indices must be dense 0..n-1
        for (i, d) in result.data.iter().enumerate() {
            assert_eq!(d.index, i as i64, "gap or duplicate at position {}", i);
        }
        result.data.iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_plan_same_stage_move_down() {
        let deals = stage("won", &[10, 11, 12, 13]);
        let updates = plan_move(&deals[0], &deals, &[], "won", Some(2));

        // 11 and 12 shift down, 10 lands at 2
        assert!(updates.contains(&IndexUpdate::shift(11, 0)));
        assert!(updates.contains(&IndexUpdate::shift(12, 1)));
        assert!(updates.contains(&IndexUpdate::shift(10, 2)));
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn test_plan_same_stage_move_up() {
        let deals = stage("won", &[10, 11, 12, 13]);
        let updates = plan_move(&deals[3], &deals, &[], "won", Some(1));

        assert!(updates.contains(&IndexUpdate::shift(11, 2)));
        assert!(updates.contains(&IndexUpdate::shift(12, 3)));
        assert!(updates.contains(&IndexUpdate::shift(13, 1)));
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn test_plan_same_stage_noop() {
        let deals = stage("won", &[10, 11, 12]);
        assert!(plan_move(&deals[1], &deals, &[], "won", Some(1)).is_empty());
    }

    #[test]
    fn test_plan_same_stage_clamps_and_appends() {
        let deals = stage("won", &[10, 11, 12]);
        // Out-of-range destination clamps to the last index
        let updates = plan_move(&deals[0], &deals, &[], "won", Some(99));
        assert!(updates.contains(&IndexUpdate::shift(10, 2)));
        // Absent destination means append
        let appended = plan_move(&deals[0], &deals, &[], "won", None);
        assert_eq!(updates, appended);
    }

    #[test]
    fn test_plan_cross_stage_shifts_both_stages() {
        // Moving deal D (proposal-sent, index 2) to won at index 0, with won
        // holding two deals: won becomes [D, old0, old1] and proposal-sent
        // closes the gap above index 2.
        let source = stage("proposal-sent", &[20, 21, 22, 23, 24]);
        let dest = stage("won", &[30, 31]);
        let moved = &source[2];

        let updates = plan_move(moved, &source, &dest, "won", Some(0));

        assert!(updates.contains(&IndexUpdate::shift(23, 2)));
        assert!(updates.contains(&IndexUpdate::shift(24, 3)));
        assert!(updates.contains(&IndexUpdate::shift(30, 1)));
        assert!(updates.contains(&IndexUpdate::shift(31, 2)));
        assert!(updates.contains(&IndexUpdate {
            id: 22,
            stage: Some("won".to_string()),
            index: 0
        }));
        assert_eq!(updates.len(), 5);
    }

    #[test]
    fn test_plan_cross_stage_append_to_empty_stage() {
        let source = stage("opportunity", &[20]);
        let updates = plan_move(&source[0], &source, &[], "lost", None);
        assert_eq!(
            updates,
            vec![IndexUpdate {
                id: 20,
                stage: Some("lost".to_string()),
                index: 0
            }]
        );
    }

    #[test]
    fn test_moved_record_patch_carries_stage() {
        let update = IndexUpdate {
            id: 5,
            stage: Some("won".to_string()),
            index: 3,
        };
        assert_eq!(update.to_patch(), json!({"index": 3, "stage": "won"}));
        assert_eq!(IndexUpdate::shift(5, 3).to_patch(), json!({"index": 3}));
    }

    #[tokio::test]
    async fn test_move_within_stage_keeps_indices_dense() {
        let provider = MemoryProvider::new();
        seed_stage(&provider, "won", &[1, 2, 3, 4]).await;
        let config = CrmConfig::default();
        let service = PipelineService::new(&provider, &config);

        service.move_deal(1, "won", Some(2)).await.unwrap();

        assert_eq!(stage_ids_in_order(&provider, "won").await, vec![2, 3, 1, 4]);
    }

    #[tokio::test]
    async fn test_cross_stage_move_end_to_end() {
        let provider = MemoryProvider::new();
        seed_stage(&provider, "proposal-sent", &[1, 2, 3, 4]).await;
        seed_stage(&provider, "won", &[10, 11]).await;
        let config = CrmConfig::default();
        let service = PipelineService::new(&provider, &config);

        service.move_deal(3, "won", Some(0)).await.unwrap();

        assert_eq!(
            stage_ids_in_order(&provider, "proposal-sent").await,
            vec![1, 2, 4]
        );
        assert_eq!(
            stage_ids_in_order(&provider, "won").await,
            vec![3, 10, 11]
        );
        let moved: Deal = provider.get_one(3).await.unwrap();
        assert_eq!(moved.stage, "won");
        assert_eq!(moved.index, 0);
    }

    #[tokio::test]
    async fn test_move_ignores_archived_records_in_stage() {
        let provider = MemoryProvider::new();
        seed_stage(&provider, "won", &[1, 2, 3]).await;
        let _: Deal = provider
            .update::<Deal>(2, json!({"archived_at": "2026-02-01T00:00:00Z"}))
            .await
            .unwrap();
        // Close the gap the archive left so the fixture starts dense
        let _: Deal = provider.update::<Deal>(3, json!({"index": 1})).await.unwrap();

        let config = CrmConfig::default();
        let service = PipelineService::new(&provider, &config);
        service.move_deal(1, "won", None).await.unwrap();

        assert_eq!(stage_ids_in_order(&provider, "won").await, vec![3, 1]);
        // Archived deal untouched
        let archived: Deal = provider.get_one(2).await.unwrap();
        assert!(archived.is_archived());
    }

    #[tokio::test]
    async fn test_move_rejects_unknown_stage() {
        let provider = MemoryProvider::new();
        seed_stage(&provider, "won", &[1]).await;
        let config = CrmConfig::default();
        let service = PipelineService::new(&provider, &config);

        let err = service.move_deal(1, "not-a-stage", None).await.unwrap_err();
        assert!(err.to_string().contains("Unknown stage"));
    }

    #[tokio::test]
    async fn test_archive_closes_gap_and_unarchive_appends() {
        let provider = MemoryProvider::new();
        seed_stage(&provider, "won", &[1, 2, 3]).await;
        let config = CrmConfig::default();
        let service = PipelineService::new(&provider, &config);

        service.archive_deal(2).await.unwrap();
        assert_eq!(stage_ids_in_order(&provider, "won").await, vec![1, 3]);

        service.unarchive_deal(2).await.unwrap();
        assert_eq!(stage_ids_in_order(&provider, "won").await, vec![1, 3, 2]);
    }
}
