//! Configuration
//!
//! Two layers: [`CrmConfig`] holds the domain vocabulary (deal stages, note
//! statuses, tag palette) and is passed explicitly into the services that
//! need it; [`AppConfig`] is the operator-facing config loaded from
//! `~/.config/atrium-crm/config.toml` with env-var overrides.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// One pipeline stage: stable value plus display label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealStage {
    pub value: String,
    pub label: String,
}

impl DealStage {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// Domain vocabulary shared by the services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_deal_stages")]
    pub deal_stages: Vec<DealStage>,
    #[serde(default = "default_note_statuses")]
    pub note_statuses: Vec<String>,
    #[serde(default = "default_contact_genders")]
    pub contact_genders: Vec<String>,
    #[serde(default = "default_company_sectors")]
    pub company_sectors: Vec<String>,
    #[serde(default = "default_task_types")]
    pub task_types: Vec<String>,
    #[serde(default = "default_tag_colors")]
    pub tag_colors: Vec<String>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            deal_stages: default_deal_stages(),
            note_statuses: default_note_statuses(),
            contact_genders: default_contact_genders(),
            company_sectors: default_company_sectors(),
            task_types: default_task_types(),
            tag_colors: default_tag_colors(),
        }
    }
}

impl CrmConfig {
    /// Check whether `stage` is a configured pipeline stage
    pub fn is_deal_stage(&self, stage: &str) -> bool {
        self.deal_stages.iter().any(|s| s.value == stage)
    }

    pub fn stage_values(&self) -> Vec<&str> {
        self.deal_stages.iter().map(|s| s.value.as_str()).collect()
    }
}

fn default_deal_stages() -> Vec<DealStage> {
    vec![
        DealStage::new("opportunity", "Opportunity"),
        DealStage::new("proposal-sent", "Proposal Sent"),
        DealStage::new("in-negociation", "In Negotiation"),
        DealStage::new("won", "Won"),
        DealStage::new("lost", "Lost"),
        DealStage::new("delayed", "Delayed"),
    ]
}

fn default_note_statuses() -> Vec<String> {
    ["cold", "warm", "hot", "in-contract"]
        .map(String::from)
        .to_vec()
}

fn default_contact_genders() -> Vec<String> {
    ["male", "female", "nonbinary"].map(String::from).to_vec()
}

fn default_company_sectors() -> Vec<String> {
    [
        "Communication Services",
        "Consumer Discretionary",
        "Consumer Staples",
        "Energy",
        "Financials",
        "Health Care",
        "Industrials",
        "Information Technology",
        "Materials",
        "Real Estate",
        "Utilities",
    ]
    .map(String::from)
    .to_vec()
}

fn default_task_types() -> Vec<String> {
    [
        "None", "Email", "Demo", "Lunch", "Meeting", "Follow-up", "Thank you", "Ship", "Call",
    ]
    .map(String::from)
    .to_vec()
}

fn default_tag_colors() -> Vec<String> {
    [
        "#eddcd2", "#fff1e6", "#fde2e4", "#fad2e1", "#c5dedd", "#dbe7e4", "#f0efeb", "#d6e2e9",
        "#bcd4e6", "#99c1de",
    ]
    .map(String::from)
    .to_vec()
}

/// On-disk config file shape (everything optional)
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    crm: Option<CrmConfig>,
}

/// Resolved operator configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub crm: CrmConfig,
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("atrium-crm").join("config.toml"))
}

impl AppConfig {
    /// Load the config file (if present) and apply env overrides
    ///
    /// `ATRIUM_CRM_URL` and `ATRIUM_CRM_API_KEY` take precedence over the
    /// file; a `.env` file is honored via dotenvy (loaded by the binary).
    pub fn load() -> Result<Self> {
        let mut file_config = FileConfig::default();
        if let Some(path) = config_file_path()
            && path.exists()
        {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            file_config = toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        }

        let base_url = std::env::var("ATRIUM_CRM_URL")
            .ok()
            .or(file_config.base_url);
        let api_key = std::env::var("ATRIUM_CRM_API_KEY")
            .ok()
            .or(file_config.api_key);

        let Some(base_url) = base_url else {
            bail!(
                "No backend configured: set ATRIUM_CRM_URL or add base_url to {}",
                config_file_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "the config file".to_string())
            );
        };

        Ok(Self {
            base_url,
            api_key,
            crm: file_config.crm.unwrap_or_default(),
        })
    }
}
