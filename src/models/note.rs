//! Contact note model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactNote {
    pub id: Id,
    pub contact_id: Id,
    #[serde(default)]
    pub text: String,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub sales_id: Option<Id>,
}

impl Resource for ContactNote {
    const RESOURCE: &'static str = "contact_notes";

    fn id(&self) -> Id {
        self.id
    }
}
