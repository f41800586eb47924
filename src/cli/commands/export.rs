//! Export command handlers

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use log::warn;

use crate::api::{DataProvider, Id, ListParams};
use crate::export::{contact_vcard, export_contacts_csv};
use crate::models::{Company, Contact};

const EXPORT_PAGE_SIZE: u32 = 1000;

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Export one contact as a vCard 3.0 file
    Vcard {
        contact_id: Id,
        /// Output path (default: <first>_<last>.vcf)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Export all contacts as CSV to stdout or a file
    Csv {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub async fn handle_export_command<P: DataProvider>(
    args: ExportCommands,
    provider: &P,
) -> Result<()> {
    match args {
        ExportCommands::Vcard { contact_id, output } => {
            let contact: Contact = provider
                .get_one(contact_id)
                .await
                .context("Failed to fetch contact")?;
            let company = match contact.company_id {
                Some(company_id) => Some(
                    provider
                        .get_one::<Company>(company_id)
                        .await
                        .context("Failed to fetch contact's company")?,
                ),
                None => None,
            };
            let photo = match &contact.avatar {
                Some(url) => match fetch_avatar(url).await {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        warn!("Skipping avatar: {:#}", err);
                        None
                    }
                },
                None => None,
            };

            let card = contact_vcard(&contact, company.as_ref(), photo.as_deref());
            let path = output.unwrap_or_else(|| default_vcard_path(&contact));
            fs::write(&path, card)
                .with_context(|| format!("Failed to write vCard: {}", path.display()))?;
            println!(
                "{} {} to {}",
                "Exported".green().bold(),
                contact.full_name(),
                path.display()
            );
        }
        ExportCommands::Csv { output } => {
            let contacts = fetch_all_contacts(provider).await?;
            let companies = fetch_companies_for(provider, &contacts).await?;

            match output {
                Some(path) => {
                    let file = fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    export_contacts_csv(&contacts, &companies, file)?;
                    println!(
                        "{} {} contacts to {}",
                        "Exported".green().bold(),
                        contacts.len(),
                        path.display()
                    );
                }
                None => {
                    let stdout = std::io::stdout();
                    export_contacts_csv(&contacts, &companies, stdout.lock())?;
                }
            }
        }
    }
    Ok(())
}

async fn fetch_avatar(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::get(url)
        .await
        .context("Failed to fetch avatar")?
        .error_for_status()
        .context("Avatar request rejected")?;
    Ok(response.bytes().await.context("Failed to read avatar")?.to_vec())
}

fn default_vcard_path(contact: &Contact) -> PathBuf {
    let name = contact.full_name().to_lowercase().replace(char::is_whitespace, "_");
    if name.is_empty() {
        PathBuf::from(format!("contact_{}.vcf", contact.id))
    } else {
        PathBuf::from(format!("{}.vcf", name))
    }
}

async fn fetch_all_contacts<P: DataProvider>(provider: &P) -> Result<Vec<Contact>> {
    let mut contacts = Vec::new();
    let mut page = 1;
    loop {
        let batch = provider
            .get_list::<Contact>(ListParams::new().paginate(page, EXPORT_PAGE_SIZE))
            .await
            .context("Failed to fetch contacts")?;
        let fetched = batch.data.len();
        contacts.extend(batch.data);
        if fetched < EXPORT_PAGE_SIZE as usize {
            break;
        }
        page += 1;
    }
    Ok(contacts)
}

async fn fetch_companies_for<P: DataProvider>(
    provider: &P,
    contacts: &[Contact],
) -> Result<HashMap<Id, Company>> {
    let ids: HashSet<Id> = contacts.iter().filter_map(|c| c.company_id).collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let companies = provider
        .get_many::<Company>(&ids.into_iter().collect::<Vec<_>>())
        .await
        .context("Failed to fetch companies")?;
    Ok(companies.into_iter().map(|c| (c.id, c)).collect())
}
