//! Two-phase CSV import
//!
//! Phase one parses the sheet and proposes a header-to-field mapping
//! ([`auto_map`]); the caller can adjust it before phase two runs the
//! actual import. Rows fail individually: a bad row lands in the error
//! report with its spreadsheet row number, the rest keep going.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{CSV_BATCH_SIZE, TagCache};
use crate::api::{DataProvider, Filter, Id, ListParams};
use crate::config::CrmConfig;
use crate::models::{Company, Contact};

/// A parsed sheet: one header row plus data rows, all as strings
#[derive(Debug, Clone)]
pub struct CsvSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse a CSV stream into a sheet, trimming whitespace around cells
pub fn parse_csv<R: Read>(reader: R) -> Result<CsvSheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr
        .headers()
        .context("Failed to read CSV header row")?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.context("Failed to read CSV row")?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(CsvSheet { headers, rows })
}

/// What the rows of a sheet describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvTarget {
    Contact,
    Company,
}

/// Importable fields for a target, in mapping-display order
pub fn target_fields(target: CsvTarget) -> &'static [&'static str] {
    match target {
        CsvTarget::Contact => &[
            "first_name",
            "last_name",
            "email",
            "phone",
            "title",
            "gender",
            "company",
            "background",
            "linkedin_url",
            "tags",
        ],
        CsvTarget::Company => &[
            "name",
            "sector",
            "size",
            "website",
            "phone_number",
            "address",
            "zipcode",
            "city",
            "state_abbr",
            "description",
            "linkedin_url",
        ],
    }
}

/// Alternate header spellings accepted per field
static FIELD_ALIASES: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut aliases: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    aliases.insert("first_name", &["firstname", "givenname", "forename"]);
    aliases.insert("last_name", &["lastname", "surname", "familyname"]);
    aliases.insert("email", &["mail", "emailaddress"]);
    aliases.insert("phone", &["phonenumber", "tel", "telephone", "mobile"]);
    aliases.insert("title", &["jobtitle", "position", "role"]);
    aliases.insert("company", &["organisation", "organization", "employer"]);
    aliases.insert("linkedin_url", &["linkedin"]);
    aliases.insert("tags", &["labels", "keywords"]);
    aliases.insert("name", &["companyname", "organisation", "organization"]);
    aliases.insert("website", &["url", "site"]);
    aliases.insert("zipcode", &["zip", "postalcode", "postcode"]);
    aliases.insert("state_abbr", &["state"]);
    aliases
});

/// Field-to-column assignments for one sheet
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    columns: BTreeMap<&'static str, usize>,
}

impl ColumnMapping {
    pub fn assign(&mut self, field: &'static str, column: usize) {
        self.columns.insert(field, column);
    }

    pub fn unassign(&mut self, field: &str) {
        self.columns.remove(field);
    }

    pub fn column(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.columns.iter().map(|(field, col)| (*field, *col))
    }
}

fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Propose a mapping from sheet headers to target fields
///
/// Exact (normalized or aliased) matches win; a substring match in either
/// direction is the fallback. Each column is assigned at most once.
pub fn auto_map(headers: &[String], target: CsvTarget) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut mapping = ColumnMapping::default();
    let mut taken = vec![false; headers.len()];

    for &field in target_fields(target) {
        let wanted = normalize_header(field);
        let aliases: &[&str] = FIELD_ALIASES.get(field).copied().unwrap_or(&[]);

        let exact = normalized
            .iter()
            .enumerate()
            .position(|(i, h)| !taken[i] && (*h == wanted || aliases.contains(&h.as_str())));
        let found = exact.or_else(|| {
            normalized.iter().enumerate().position(|(i, h)| {
                !taken[i] && !h.is_empty() && (h.contains(&wanted) || wanted.contains(h.as_str()))
            })
        });

        if let Some(col) = found {
            taken[col] = true;
            mapping.assign(field, col);
            debug!("Mapped column '{}' -> {}", headers[col], field);
        }
    }
    mapping
}

/// One row that could not be imported
#[derive(Debug, Serialize)]
pub struct RowError {
    /// Spreadsheet row number (header is row 1)
    pub row: usize,
    pub message: String,
}

/// Result of one CSV import run
#[derive(Debug, Default)]
pub struct CsvImportReport {
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

impl CsvImportReport {
    fn record_failure(&mut self, row: usize, message: String) {
        self.failed += 1;
        self.errors.push(RowError { row, message });
    }

    /// Write the failed rows as a CSV error-report file
    pub fn write_error_report(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create error report: {}", path.display()))?;
        writer.write_record(["row", "message"])?;
        for error in &self.errors {
            writer.write_record([error.row.to_string(), error.message.clone()])?;
        }
        writer.flush()?;
        log::info!("Error report written to {}", path.display());
        Ok(())
    }
}

/// Company name -> id cache with fetch-or-create, scoped to one import
#[derive(Debug, Default)]
struct CompanyCache {
    by_name: HashMap<String, Id>,
}

impl CompanyCache {
    async fn resolve_or_create<P: DataProvider>(&mut self, provider: &P, name: &str) -> Result<Id> {
        let trimmed = name.trim();
        let key = trimmed.to_lowercase();
        if let Some(id) = self.by_name.get(&key) {
            return Ok(*id);
        }

        let existing = provider
            .get_list::<Company>(
                ListParams::new()
                    .filter(Filter::eq("name", json!(trimmed)))
                    .paginate(1, 1),
            )
            .await
            .with_context(|| format!("Failed to look up company '{}'", trimmed))?;
        let id = match existing.data.into_iter().next() {
            Some(company) => company.id,
            None => {
                let created: Company = provider
                    .create(json!({"name": trimmed, "created_at": Utc::now()}))
                    .await
                    .with_context(|| format!("Failed to create company '{}'", trimmed))?;
                debug!("Created company '{}' ({})", created.name, created.id);
                created.id
            }
        };
        self.by_name.insert(key, id);
        Ok(id)
    }
}

/// CSV import orchestrator
pub struct CsvImporter<'a, P> {
    provider: &'a P,
    config: &'a CrmConfig,
}

impl<'a, P: DataProvider> CsvImporter<'a, P> {
    pub fn new(provider: &'a P, config: &'a CrmConfig) -> Self {
        Self { provider, config }
    }

    /// Import a parsed sheet through the given mapping
    pub async fn run(
        &self,
        sheet: &CsvSheet,
        mapping: &ColumnMapping,
        target: CsvTarget,
    ) -> Result<CsvImportReport> {
        if mapping.is_empty() {
            bail!("No columns mapped; check the CSV headers against the expected fields");
        }

        let mut report = CsvImportReport::default();
        let mut tags = TagCache::seed(self.provider).await?;
        let mut companies = CompanyCache::default();

        // Resolve lookups row by row so the caches stay coherent, then
        // create in small concurrent batches
        let mut pending: Vec<(usize, Value)> = Vec::new();
        for (i, row) in sheet.rows.iter().enumerate() {
            let row_number = i + 2;
            match self
                .build_row(row, mapping, target, &mut companies, &mut tags)
                .await
            {
                Ok(payload) => pending.push((row_number, payload)),
                Err(err) => {
                    warn!("Skipping row {}: {:#}", row_number, err);
                    report.record_failure(row_number, format!("{:#}", err));
                }
            }
        }

        for chunk in pending.chunks(CSV_BATCH_SIZE) {
            let results = join_all(chunk.iter().map(|(row, payload)| async move {
                (*row, self.create(target, payload.clone()).await)
            }))
            .await;
            for (row, result) in results {
                match result {
                    Ok(()) => report.imported += 1,
                    Err(err) => {
                        warn!("Failed to import row {}: {:#}", row, err);
                        report.record_failure(row, format!("{:#}", err));
                    }
                }
            }
        }

        Ok(report)
    }

    async fn create(&self, target: CsvTarget, payload: Value) -> Result<()> {
        match target {
            CsvTarget::Contact => self.provider.create::<Contact>(payload).await.map(|_| ()),
            CsvTarget::Company => self.provider.create::<Company>(payload).await.map(|_| ()),
        }
    }

    async fn build_row(
        &self,
        row: &[String],
        mapping: &ColumnMapping,
        target: CsvTarget,
        companies: &mut CompanyCache,
        tags: &mut TagCache,
    ) -> Result<Value> {
        let cell = |field: &str| -> Option<&str> {
            mapping
                .column(field)
                .and_then(|col| row.get(col))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };

        let mut out = Map::new();
        match target {
            CsvTarget::Contact => {
                let first_name = cell("first_name");
                let last_name = cell("last_name");
                if first_name.is_none() && last_name.is_none() {
                    bail!("missing first and last name");
                }
                out.insert("first_name".to_string(), json!(first_name.unwrap_or("")));
                out.insert("last_name".to_string(), json!(last_name.unwrap_or("")));

                for field in ["title", "gender", "background", "linkedin_url"] {
                    if let Some(value) = cell(field) {
                        out.insert(field.to_string(), json!(value));
                    }
                }
                if let Some(email) = cell("email") {
                    out.insert(
                        "email_jsonb".to_string(),
                        json!([{"email": email, "type": "Work"}]),
                    );
                }
                if let Some(phone) = cell("phone") {
                    out.insert(
                        "phone_jsonb".to_string(),
                        json!([{"number": phone, "type": "Work"}]),
                    );
                }
                if let Some(company) = cell("company") {
                    let company_id = companies.resolve_or_create(self.provider, company).await?;
                    out.insert("company_id".to_string(), json!(company_id));
                }
                if let Some(raw) = cell("tags") {
                    let mut tag_ids = Vec::new();
                    for name in raw.split([',', ';']).map(str::trim).filter(|s| !s.is_empty()) {
                        tag_ids.push(
                            tags.resolve_or_create(self.provider, name, &self.config.tag_colors)
                                .await?,
                        );
                    }
                    out.insert("tags".to_string(), json!(tag_ids));
                }
                let now = json!(Utc::now());
                out.insert("first_seen".to_string(), now.clone());
                out.insert("last_seen".to_string(), now);
            }
            CsvTarget::Company => {
                let name = cell("name").ok_or_else(|| anyhow!("missing company name"))?;
                out.insert("name".to_string(), json!(name));
                for field in [
                    "sector",
                    "website",
                    "phone_number",
                    "address",
                    "zipcode",
                    "city",
                    "state_abbr",
                    "description",
                    "linkedin_url",
                ] {
                    if let Some(value) = cell(field) {
                        out.insert(field.to_string(), json!(value));
                    }
                }
                if let Some(raw) = cell("size") {
                    let size: i64 = raw
                        .parse()
                        .map_err(|_| anyhow!("invalid size '{}'", raw))?;
                    out.insert("size".to_string(), json!(size));
                }
                out.insert("created_at".to_string(), json!(Utc::now()));
            }
        }
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryProvider;
    use crate::models::Tag;
    use std::io::Cursor;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_csv_trims_cells() {
        let sheet = parse_csv(Cursor::new("a, b\n 1 ,2\n")).unwrap();
        assert_eq!(sheet.headers, vec!["a", "b"]);
        assert_eq!(sheet.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn test_auto_map_exact_alias_and_substring() {
        let headers = headers(&["First Name", "Surname", "E-mail", "Organisation", "My Tags"]);
        let mapping = auto_map(&headers, CsvTarget::Contact);

        assert_eq!(mapping.column("first_name"), Some(0));
        assert_eq!(mapping.column("last_name"), Some(1));
        assert_eq!(mapping.column("email"), Some(2));
        assert_eq!(mapping.column("company"), Some(3));
        assert_eq!(mapping.column("tags"), Some(4));
        assert_eq!(mapping.column("phone"), None);
    }

    #[test]
    fn test_auto_map_assigns_each_column_once() {
        let headers = headers(&["name"]);
        let mapping = auto_map(&headers, CsvTarget::Contact);
        let assigned: Vec<_> = mapping.assignments().collect();
        assert_eq!(assigned.len(), 1);
    }

    #[tokio::test]
    async fn test_contact_import_with_row_isolation() {
        let provider = MemoryProvider::new();
        let config = CrmConfig::default();
        let sheet = parse_csv(Cursor::new(
            "first_name,last_name,email,company,tags\n\
             Ada,Lovelace,ada@acme.com,Acme,vip\n\
             ,,noname@acme.com,Acme,\n\
             Grace,Hopper,grace@acme.com,Acme,vip;navy\n",
        ))
        .unwrap();
        let mapping = auto_map(&sheet.headers, CsvTarget::Contact);

        let report = CsvImporter::new(&provider, &config)
            .run(&sheet, &mapping, CsvTarget::Contact)
            .await
            .unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].row, 3);
        assert_eq!(provider.count::<Contact>(), 2);
        // Both rows share one company and the "vip" tag
        assert_eq!(provider.count::<Company>(), 1);
        assert_eq!(provider.count::<Tag>(), 2);
    }

    #[tokio::test]
    async fn test_company_import_reuses_existing_by_name() {
        let provider = MemoryProvider::new();
        let config = CrmConfig::default();
        let existing: Company = provider
            .create(json!({"name": "Acme"}))
            .await
            .unwrap();

        let sheet = parse_csv(Cursor::new(
            "first_name,last_name,company\nAda,Lovelace,Acme\n",
        ))
        .unwrap();
        let mapping = auto_map(&sheet.headers, CsvTarget::Contact);
        CsvImporter::new(&provider, &config)
            .run(&sheet, &mapping, CsvTarget::Contact)
            .await
            .unwrap();

        assert_eq!(provider.count::<Company>(), 1);
        let contact: Contact = provider.get_one(1).await.unwrap();
        assert_eq!(contact.company_id, Some(existing.id));
    }

    #[tokio::test]
    async fn test_company_import_validates_size() {
        let provider = MemoryProvider::new();
        let config = CrmConfig::default();
        let sheet = parse_csv(Cursor::new(
            "name,sector,size\nAcme,Energy,250\nGlobex,Retail,many\n",
        ))
        .unwrap();
        let mapping = auto_map(&sheet.headers, CsvTarget::Company);

        let report = CsvImporter::new(&provider, &config)
            .run(&sheet, &mapping, CsvTarget::Company)
            .await
            .unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].message.contains("invalid size"));
        let company: Company = provider.get_one(1).await.unwrap();
        assert_eq!(company.size, Some(250));
    }
}
