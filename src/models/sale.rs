//! Sales-person model

use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Id,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub administrator: bool,
}

impl Resource for Sale {
    const RESOURCE: &'static str = "sales";

    fn id(&self) -> Id {
        self.id
    }
}
