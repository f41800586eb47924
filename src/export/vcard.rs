//! vCard 3.0 rendering (RFC 2426)
//!
//! Text values are escaped and every physical line is folded at 75 octets
//! with a CRLF-plus-space continuation, so addressbook clients that enforce
//! the limit accept the output.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;

use crate::models::{Company, Contact};

const FOLD_WIDTH: usize = 75;

/// Escape a text value per RFC 2426 section 2.4.2
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Fold a logical line at 75 octets, never splitting a UTF-8 character
fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_WIDTH {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / FOLD_WIDTH * 3);
    let mut budget = FOLD_WIDTH;
    let mut used = 0;
    for ch in line.chars() {
        let width = ch.len_utf8();
        if used + width > budget {
            out.push_str("\r\n ");
            used = 0;
            // Continuation lines spend one octet on the leading space
            budget = FOLD_WIDTH - 1;
        }
        out.push(ch);
        used += width;
    }
    out
}

/// Render one contact as a vCard 3.0 string
///
/// `photo` is raw image bytes; it is emitted base64-encoded when present.
pub fn contact_vcard(contact: &Contact, company: Option<&Company>, photo: Option<&[u8]>) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("BEGIN:VCARD".to_string());
    lines.push("VERSION:3.0".to_string());
    lines.push(format!(
        "N:{};{};;;",
        escape_text(&contact.last_name),
        escape_text(&contact.first_name)
    ));
    lines.push(format!("FN:{}", escape_text(&contact.full_name())));

    if let Some(company) = company {
        lines.push(format!("ORG:{}", escape_text(&company.name)));
    }
    if let Some(title) = &contact.title {
        lines.push(format!("TITLE:{}", escape_text(title)));
    }
    for entry in &contact.email_jsonb {
        lines.push(format!(
            "EMAIL;TYPE={}:{}",
            entry.kind.to_uppercase(),
            escape_text(&entry.email)
        ));
    }
    for entry in &contact.phone_jsonb {
        lines.push(format!(
            "TEL;TYPE={}:{}",
            entry.kind.to_uppercase(),
            escape_text(&entry.number)
        ));
    }
    if let Some(url) = &contact.linkedin_url {
        lines.push(format!("URL:{}", escape_text(url)));
    }
    if let Some(background) = &contact.background {
        lines.push(format!("NOTE:{}", escape_text(background)));
    }
    if let Some(bytes) = photo {
        lines.push(format!(
            "PHOTO;ENCODING=b;TYPE=JPEG:{}",
            BASE64.encode(bytes)
        ));
    }
    lines.push(format!("REV:{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
    lines.push("END:VCARD".to_string());

    let mut out = String::new();
    for line in lines {
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailEntry, PhoneEntry};

    fn contact_fixture() -> Contact {
        Contact {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            gender: None,
            title: Some("Analyst, Engines".to_string()),
            email_jsonb: vec![
                EmailEntry::new("ada@acme.com", "Work"),
                EmailEntry::new("ada@home.net", "Home"),
            ],
            phone_jsonb: vec![PhoneEntry::new("+1 555 0100", "Work")],
            background: Some("Met at conf;\nfollow up".to_string()),
            avatar: None,
            first_seen: None,
            last_seen: None,
            has_newsletter: false,
            status: None,
            tags: vec![],
            company_id: Some(3),
            sales_id: None,
            linkedin_url: Some("https://linkedin.com/in/ada".to_string()),
        }
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d"), "a\\,b\\;c\\\\d");
        assert_eq!(escape_text("line1\r\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_fold_line_short_passthrough() {
        assert_eq!(fold_line("FN:Ada"), "FN:Ada");
    }

    #[test]
    fn test_fold_line_limits_physical_lines() {
        let long = format!("NOTE:{}", "x".repeat(200));
        let folded = fold_line(&long);
        for (i, physical) in folded.split("\r\n").enumerate() {
            assert!(physical.len() <= 75, "line {} is {} octets", i, physical.len());
            if i > 0 {
                assert!(physical.starts_with(' '));
            }
        }
        // Unfolding restores the original
        assert_eq!(folded.replace("\r\n ", ""), long);
    }

    #[test]
    fn test_fold_line_respects_utf8_boundaries() {
        let long = format!("NOTE:{}", "é".repeat(100));
        let folded = fold_line(&long);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", ""), long);
    }

    #[test]
    fn test_vcard_structure() {
        let contact = contact_fixture();
        let company = Company {
            id: 3,
            name: "Acme, Inc".to_string(),
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
        };

        let card = contact_vcard(&contact, Some(&company), None);
        assert!(card.starts_with("BEGIN:VCARD\r\nVERSION:3.0\r\n"));
        assert!(card.ends_with("END:VCARD\r\n"));
        assert!(card.contains("N:Lovelace;Ada;;;\r\n"));
        assert!(card.contains("FN:Ada Lovelace\r\n"));
        assert!(card.contains("ORG:Acme\\, Inc\r\n"));
        assert!(card.contains("TITLE:Analyst\\, Engines\r\n"));
        assert!(card.contains("EMAIL;TYPE=WORK:ada@acme.com\r\n"));
        assert!(card.contains("EMAIL;TYPE=HOME:ada@home.net\r\n"));
        assert!(card.contains("TEL;TYPE=WORK:+1 555 0100\r\n"));
        assert!(card.contains("URL:https://linkedin.com/in/ada\r\n"));
        assert!(card.contains("NOTE:Met at conf\\;\\nfollow up\r\n"));
        assert!(card.contains("REV:"));
    }

    #[test]
    fn test_vcard_photo_is_base64() {
        let contact = contact_fixture();
        let card = contact_vcard(&contact, None, Some(&[0xFF, 0xD8, 0xFF]));
        assert!(card.contains("PHOTO;ENCODING=b;TYPE=JPEG:/9j/"));
        assert!(!card.contains("ORG:"));
    }
}
