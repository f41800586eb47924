//! CSV contact export

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};

use crate::api::Id;
use crate::models::{Company, Contact};

/// Write contacts as CSV, resolving company names through the given lookup
pub fn export_contacts_csv<W: Write>(
    contacts: &[Contact],
    companies: &HashMap<Id, Company>,
    writer: W,
) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record([
        "first_name",
        "last_name",
        "title",
        "email",
        "phone",
        "company",
        "linkedin_url",
        "status",
        "first_seen",
        "last_seen",
    ])
    .context("Failed to write CSV header")?;

    for contact in contacts {
        let company = contact
            .company_id
            .and_then(|id| companies.get(&id))
            .map(|c| c.name.as_str())
            .unwrap_or("");
        let email = contact
            .email_jsonb
            .first()
            .map(|e| e.email.as_str())
            .unwrap_or("");
        let phone = contact
            .phone_jsonb
            .first()
            .map(|p| p.number.as_str())
            .unwrap_or("");
        out.write_record([
            contact.first_name.as_str(),
            contact.last_name.as_str(),
            contact.title.as_deref().unwrap_or(""),
            email,
            phone,
            company,
            contact.linkedin_url.as_deref().unwrap_or(""),
            contact.status.as_deref().unwrap_or(""),
            &contact
                .first_seen
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            &contact
                .last_seen
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
        ])
        .context("Failed to write CSV row")?;
    }
    out.flush().context("Failed to flush CSV output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailEntry;

    #[test]
    fn test_export_resolves_company_and_primary_email() {
        let contact = Contact {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            gender: None,
            title: None,
            email_jsonb: vec![
                EmailEntry::new("ada@acme.com", "Work"),
                EmailEntry::new("ada@home.net", "Home"),
            ],
            phone_jsonb: vec![],
            background: None,
            avatar: None,
            first_seen: None,
            last_seen: None,
            has_newsletter: false,
            status: None,
            tags: vec![],
            company_id: Some(3),
            sales_id: None,
            linkedin_url: None,
        };
        let mut companies = HashMap::new();
        companies.insert(
            3,
            Company {
                id: 3,
                name: "Acme".to_string(),
                sector: None,
                size: None,
                website: None,
                linkedin_url: None,
                phone_number: None,
                address: None,
                zipcode: None,
                city: None,
                state_abbr: None,
                description: None,
                sales_id: None,
                created_at: None,
            },
        );

        let mut buf = Vec::new();
        export_contacts_csv(&[contact], &companies, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("first_name,last_name"));
        let row = lines.next().unwrap();
        assert!(row.contains("Ada,Lovelace"));
        assert!(row.contains("ada@acme.com"));
        assert!(row.contains("Acme"));
        assert!(!row.contains("ada@home.net"));
    }
}
