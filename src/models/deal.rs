//! Deal model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

/// A deal on the pipeline board
///
/// Within a non-archived stage, `index` values form a dense zero-based
/// ordering matching display order. [`crate::services::pipeline`] is the only
/// writer of `stage`/`index` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    pub stage: String,
    #[serde(default)]
    pub index: i64,
    pub company_id: Option<Id>,
    #[serde(default)]
    pub contact_ids: Vec<Id>,
    #[serde(default)]
    pub amount: f64,
    pub category: Option<String>,
    pub sales_id: Option<Id>,
    pub created_at: Option<DateTime<Utc>>,
    pub expected_closing_date: Option<DateTime<Utc>>,
    /// Soft delete; archived deals keep their last index but are excluded
    /// from the stage ordering invariant
    pub archived_at: Option<DateTime<Utc>>,
}

impl Deal {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

impl Resource for Deal {
    const RESOURCE: &'static str = "deals";

    fn id(&self) -> Id {
        self.id
    }
}
