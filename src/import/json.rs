//! Streaming JSON bulk import
//!
//! The import file is a single object whose top-level `sales`, `companies`,
//! `contacts`, `notes` and `tasks` arrays may be arbitrarily large, so it is
//! never materialized: a `DeserializeSeed` visitor walks the document on a
//! blocking thread and hands each array element through a bounded channel.
//! The consumer batches records (50 per batch, one kind per batch), flushing
//! on every kind boundary so a record can always resolve parents created
//! earlier in the stream.
//!
//! A record that fails its shape guard aborts the whole run; a record whose
//! parent id is unknown, or whose create is rejected, only fails itself.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use super::{IdRemapper, ImportReport, JSON_BATCH_SIZE, RecordKind, ShapeError, TagCache};
use crate::api::{DataProvider, Id};
use crate::config::CrmConfig;
use crate::models::{Company, Contact, ContactNote, Sale, Task};

type RecordMessage = (RecordKind, Value);

/// Seed that walks the top-level object, streaming known arrays and
/// skipping everything else
struct DocumentSeed {
    tx: mpsc::Sender<RecordMessage>,
    cancel: Arc<AtomicBool>,
}

impl<'de> DeserializeSeed<'de> for DocumentSeed {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for DocumentSeed {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an object with sales/companies/contacts/notes/tasks arrays")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            match RecordKind::from_key(&key) {
                Some(kind) => map.next_value_seed(ArraySeed {
                    kind,
                    tx: &self.tx,
                    cancel: &self.cancel,
                })?,
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// Seed that streams one array's elements into the channel
struct ArraySeed<'a> {
    kind: RecordKind,
    tx: &'a mpsc::Sender<RecordMessage>,
    cancel: &'a AtomicBool,
}

impl<'de> DeserializeSeed<'de> for ArraySeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ArraySeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "an array of {} records", self.kind)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(record) = seq.next_element::<Value>()? {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(de::Error::custom("import cancelled"));
            }
            // A closed channel means the consumer bailed; stop reading
            self.tx
                .blocking_send((self.kind, record))
                .map_err(|_| de::Error::custom("import aborted"))?;
        }
        Ok(())
    }
}

/// Verify the required shape for a record kind
fn check_shape(kind: RecordKind, record: &Value) -> Result<(), ShapeError> {
    let fail = |message: &str| ShapeError {
        kind,
        message: message.to_string(),
    };
    let Some(obj) = record.as_object() else {
        return Err(fail("not an object"));
    };

    let has_str = |key: &str| obj.get(key).is_some_and(|v| v.as_str().is_some());
    let has_id = |key: &str| obj.get(key).is_some_and(|v| v.as_i64().is_some());

    match kind {
        RecordKind::Sales => {
            if !has_id("id") {
                return Err(fail("missing numeric 'id'"));
            }
            if !has_str("email") {
                return Err(fail("missing 'email'"));
            }
            if !has_str("name") {
                return Err(fail("missing 'name'"));
            }
        }
        RecordKind::Companies => {
            if !has_id("id") {
                return Err(fail("missing numeric 'id'"));
            }
            if !has_str("name") {
                return Err(fail("missing 'name'"));
            }
        }
        RecordKind::Contacts => {
            if !has_id("id") {
                return Err(fail("missing numeric 'id'"));
            }
            if !has_str("name") && !has_str("first_name") && !has_str("last_name") {
                return Err(fail("missing name fields"));
            }
        }
        RecordKind::Notes | RecordKind::Tasks => {
            if !has_str("text") {
                return Err(fail("missing 'text'"));
            }
        }
    }
    Ok(())
}

/// Split a display name at the first whitespace
fn split_name(name: &str) -> (String, String) {
    match name.trim().split_once(char::is_whitespace) {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

fn copy_str(src: &Map<String, Value>, from: &str, dst: &mut Map<String, Value>, to: &str) {
    if let Some(value) = src.get(from).and_then(Value::as_str) {
        dst.insert(to.to_string(), json!(value));
    }
}

/// Streaming JSON import orchestrator
pub struct JsonImporter<'a, P> {
    provider: &'a P,
    config: &'a CrmConfig,
}

impl<'a, P: DataProvider> JsonImporter<'a, P> {
    pub fn new(provider: &'a P, config: &'a CrmConfig) -> Self {
        Self { provider, config }
    }

    /// Run an import from any reader (file, stdin, buffer)
    pub async fn run<R: Read + Send + 'static>(&self, reader: R) -> Result<ImportReport> {
        let (tx, mut rx) = mpsc::channel::<RecordMessage>(JSON_BATCH_SIZE * 2);
        let cancel = Arc::new(AtomicBool::new(false));
        let parser_cancel = cancel.clone();
        let parser = tokio::task::spawn_blocking(move || -> Result<()> {
            let mut deserializer = serde_json::Deserializer::from_reader(reader);
            DocumentSeed {
                tx,
                cancel: parser_cancel,
            }
            .deserialize(&mut deserializer)
            .context("Failed to parse import file")?;
            Ok(())
        });

        let mut report = ImportReport::default();
        let mut remap = IdRemapper::default();
        let mut tags = TagCache::seed(self.provider).await?;
        let mut batch: Vec<Value> = Vec::new();
        let mut batch_kind: Option<RecordKind> = None;
        let mut shape_failure: Option<ShapeError> = None;

        while let Some((kind, record)) = rx.recv().await {
            if let Err(err) = check_shape(kind, &record) {
                // Required-shape violations poison the whole run
                cancel.store(true, Ordering::Relaxed);
                shape_failure = Some(err);
                break;
            }

            // A kind boundary (or a full batch) forces the current batch to
            // fully resolve before later records are touched
            if batch_kind != Some(kind) || batch.len() >= JSON_BATCH_SIZE {
                if let Some(current) = batch_kind.take() {
                    self.flush(current, std::mem::take(&mut batch), &mut remap, &mut tags, &mut report)
                        .await;
                }
                batch_kind = Some(kind);
            }
            batch.push(record);
        }
        drop(rx);

        if let Some(err) = shape_failure {
            // Wait out the aborted parser before surfacing the error
            let _ = parser.await;
            return Err(anyhow!(err).context("Import aborted"));
        }

        if let Some(current) = batch_kind {
            self.flush(current, batch, &mut remap, &mut tags, &mut report)
                .await;
        }

        parser
            .await
            .context("Import parser task panicked")??;
        Ok(report)
    }

    /// Resolve and create one batch; intra-batch creates run concurrently
    async fn flush(
        &self,
        kind: RecordKind,
        records: Vec<Value>,
        remap: &mut IdRemapper,
        tags: &mut TagCache,
        report: &mut ImportReport,
    ) {
        debug!("Importing batch of {} {} records", records.len(), kind);

        let mut pending: Vec<(Option<i64>, Value, Value)> = Vec::new();
        for record in records {
            match self.build_payload(kind, &record, remap, tags).await {
                Ok((source_id, payload)) => pending.push((source_id, payload, record)),
                Err(reason) => {
                    warn!("Skipping {} record: {}", kind, reason);
                    report.record_failed(kind, record);
                }
            }
        }

        let results = join_all(pending.into_iter().map(|(source_id, payload, original)| {
            async move {
                let created = self.create_record(kind, payload).await;
                (source_id, original, created)
            }
        }))
        .await;

        for (source_id, original, created) in results {
            match created {
                Ok(backend_id) => {
                    report.record_imported(kind);
                    if let Some(source_id) = source_id {
                        remap.insert(kind, source_id, backend_id);
                    }
                }
                Err(err) => {
                    warn!("Failed to create {} record: {:#}", kind, err);
                    report.record_failed(kind, original);
                }
            }
        }
    }

    /// Build the create payload for one record, resolving foreign keys
    /// through the remap table; errors here fail only this record
    async fn build_payload(
        &self,
        kind: RecordKind,
        record: &Value,
        remap: &IdRemapper,
        tags: &mut TagCache,
    ) -> Result<(Option<i64>, Value)> {
        let obj = record
            .as_object()
            .ok_or_else(|| anyhow!("record is not an object"))?;
        let source_id = obj.get("id").and_then(Value::as_i64);

        let resolve_fk = |key: &str, parent: RecordKind| -> Result<Option<Id>> {
            match obj.get(key).and_then(Value::as_i64) {
                Some(raw) => remap
                    .resolve(parent, raw)
                    .map(Some)
                    .ok_or_else(|| anyhow!("unknown {} '{}'", key, raw)),
                None => Ok(None),
            }
        };

        let payload = match kind {
            RecordKind::Sales => {
                let (first_name, last_name) =
                    split_name(obj.get("name").and_then(Value::as_str).unwrap_or_default());
                json!({
                    "first_name": first_name,
                    "last_name": last_name,
                    "email": obj.get("email").and_then(Value::as_str),
                    "administrator": false,
                })
            }
            RecordKind::Companies => {
                let mut out = Map::new();
                copy_str(obj, "name", &mut out, "name");
                copy_str(obj, "sector", &mut out, "sector");
                copy_str(obj, "website", &mut out, "website");
                copy_str(obj, "linkedinUrl", &mut out, "linkedin_url");
                copy_str(obj, "phoneNumber", &mut out, "phone_number");
                copy_str(obj, "address", &mut out, "address");
                copy_str(obj, "zipcode", &mut out, "zipcode");
                copy_str(obj, "city", &mut out, "city");
                copy_str(obj, "stateAbbr", &mut out, "state_abbr");
                copy_str(obj, "description", &mut out, "description");
                if let Some(size) = obj.get("size").and_then(Value::as_i64) {
                    out.insert("size".to_string(), json!(size));
                }
                if let Some(sales_id) = resolve_fk("salesId", RecordKind::Sales)? {
                    out.insert("sales_id".to_string(), json!(sales_id));
                }
                out.insert("created_at".to_string(), json!(Utc::now()));
                Value::Object(out)
            }
            RecordKind::Contacts => {
                let mut out = Map::new();
                let (first_name, last_name) = match (
                    obj.get("first_name").and_then(Value::as_str),
                    obj.get("last_name").and_then(Value::as_str),
                ) {
                    (Some(first), Some(last)) => (first.to_string(), last.to_string()),
                    _ => split_name(obj.get("name").and_then(Value::as_str).unwrap_or_default()),
                };
                out.insert("first_name".to_string(), json!(first_name));
                out.insert("last_name".to_string(), json!(last_name));
                copy_str(obj, "gender", &mut out, "gender");
                copy_str(obj, "title", &mut out, "title");
                copy_str(obj, "background", &mut out, "background");
                copy_str(obj, "linkedinUrl", &mut out, "linkedin_url");
                if let Some(email) = obj.get("email").and_then(Value::as_str) {
                    out.insert(
                        "email_jsonb".to_string(),
                        json!([{"email": email, "type": "Work"}]),
                    );
                } else if let Some(emails) = obj.get("email_jsonb") {
                    out.insert("email_jsonb".to_string(), emails.clone());
                }
                if let Some(phone) = obj.get("phoneNumber").and_then(Value::as_str) {
                    out.insert(
                        "phone_jsonb".to_string(),
                        json!([{"number": phone, "type": "Work"}]),
                    );
                } else if let Some(phones) = obj.get("phone_jsonb") {
                    out.insert("phone_jsonb".to_string(), phones.clone());
                }
                if let Some(newsletter) = obj.get("hasNewsletter").and_then(Value::as_bool) {
                    out.insert("has_newsletter".to_string(), json!(newsletter));
                }
                if let Some(company_id) = resolve_fk("companyId", RecordKind::Companies)? {
                    out.insert("company_id".to_string(), json!(company_id));
                }
                if let Some(sales_id) = resolve_fk("salesId", RecordKind::Sales)? {
                    out.insert("sales_id".to_string(), json!(sales_id));
                }
                if let Some(names) = obj.get("tags").and_then(Value::as_array) {
                    let mut tag_ids = Vec::new();
                    for name in names.iter().filter_map(Value::as_str) {
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
                Value::Object(out)
            }
            RecordKind::Notes => {
                let contact_id = resolve_fk("contactId", RecordKind::Contacts)?
                    .ok_or_else(|| anyhow!("missing contactId"))?;
                let mut out = Map::new();
                out.insert("contact_id".to_string(), json!(contact_id));
                copy_str(obj, "text", &mut out, "text");
                copy_str(obj, "status", &mut out, "status");
                match obj.get("date").and_then(Value::as_str) {
                    Some(date) => {
                        out.insert("date".to_string(), json!(date));
                    }
                    None => {
                        out.insert("date".to_string(), json!(Utc::now()));
                    }
                }
                if let Some(sales_id) = resolve_fk("salesId", RecordKind::Sales)? {
                    out.insert("sales_id".to_string(), json!(sales_id));
                }
                Value::Object(out)
            }
            RecordKind::Tasks => {
                let contact_id = resolve_fk("contactId", RecordKind::Contacts)?
                    .ok_or_else(|| anyhow!("missing contactId"))?;
                let mut out = Map::new();
                out.insert("contact_id".to_string(), json!(contact_id));
                copy_str(obj, "text", &mut out, "text");
                copy_str(obj, "type", &mut out, "type");
                copy_str(obj, "dueDate", &mut out, "due_date");
                if let Some(sales_id) = resolve_fk("salesId", RecordKind::Sales)? {
                    out.insert("sales_id".to_string(), json!(sales_id));
                }
                Value::Object(out)
            }
        };

        Ok((source_id, payload))
    }

    async fn create_record(&self, kind: RecordKind, payload: Value) -> Result<Id> {
        match kind {
            RecordKind::Sales => self.provider.create::<Sale>(payload).await.map(|r| r.id),
            RecordKind::Companies => self.provider.create::<Company>(payload).await.map(|r| r.id),
            RecordKind::Contacts => self.provider.create::<Contact>(payload).await.map(|r| r.id),
            RecordKind::Notes => self
                .provider
                .create::<ContactNote>(payload)
                .await
                .map(|r| r.id),
            RecordKind::Tasks => self.provider.create::<Task>(payload).await.map(|r| r.id),
        }
    }
}
