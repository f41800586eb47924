//! Task model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub contact_id: Id,
    #[serde(rename = "type", default = "default_task_kind")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    pub due_date: Option<DateTime<Utc>>,
    pub done_date: Option<DateTime<Utc>>,
    pub sales_id: Option<Id>,
}

fn default_task_kind() -> String {
    "None".to_string()
}

impl Resource for Task {
    const RESOURCE: &'static str = "tasks";

    fn id(&self) -> Id {
        self.id
    }
}
