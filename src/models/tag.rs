//! Tag model

use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

/// Label attached to contacts by id; created on demand during import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
}

impl Resource for Tag {
    const RESOURCE: &'static str = "tags";

    fn id(&self) -> Id {
        self.id
    }
}
