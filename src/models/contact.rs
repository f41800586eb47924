//! Contact model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{Id, Resource};

/// One email address with its usage label
///
/// Entries are unique by `email` within a contact; [`crate::services::merge`]
/// relies on that when unioning two contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailEntry {
    pub email: String,
    #[serde(rename = "type", default = "default_entry_kind")]
    pub kind: String,
}

impl EmailEntry {
    pub fn new(email: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            kind: kind.into(),
        }
    }
}

/// One phone number with its usage label, unique by `number` within a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneEntry {
    pub number: String,
    #[serde(rename = "type", default = "default_entry_kind")]
    pub kind: String,
}

impl PhoneEntry {
    pub fn new(number: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            kind: kind.into(),
        }
    }
}

fn default_entry_kind() -> String {
    "Work".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Id,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub gender: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub email_jsonb: Vec<EmailEntry>,
    #[serde(default)]
    pub phone_jsonb: Vec<PhoneEntry>,
    pub background: Option<String>,
    pub avatar: Option<String>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_newsletter: bool,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<Id>,
    pub company_id: Option<Id>,
    pub sales_id: Option<Id>,
    pub linkedin_url: Option<String>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl Resource for Contact {
    const RESOURCE: &'static str = "contacts";

    fn id(&self) -> Id {
        self.id
    }
}
