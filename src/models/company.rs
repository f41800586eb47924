//! Company model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Id,
    pub name: String,
    pub sector: Option<String>,
    pub size: Option<i64>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub zipcode: Option<String>,
    pub city: Option<String>,
    pub state_abbr: Option<String>,
    pub description: Option<String>,
    pub sales_id: Option<Id>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Resource for Company {
    const RESOURCE: &'static str = "companies";

    fn id(&self) -> Id {
        self.id
    }
}
