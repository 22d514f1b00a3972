//! Schema drift detection.
//!
//! Infers a structural schema from a live payload, compares it against the
//! persisted baseline for `{provider, schema_name}` and classifies the
//! difference. Baselines are created on first observation and only replaced
//! through [`SchemaDriftDetector::rebaseline`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::compute_hash;
use crate::traits::BaselineStore;

/// More added fields than this escalates additive drift from low to medium.
/// Additions alone never go above medium.
pub const MEDIUM_ADDED_FIELDS_THRESHOLD: usize = 5;

/// Field name used for a primitive payload root.
pub const ROOT_FIELD: &str = "$";

/// Field name used for non-object array elements.
pub const ARRAY_ITEM_FIELD: &str = "[]";

/// Inferred runtime type of a payload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Null,
    Undefined,
    Unknown,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Null => "null",
            FieldType::Undefined => "undefined",
            FieldType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One node of an inferred schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<SchemaField>>,
}

/// Infer the structural schema of `payload`.
///
/// Object keys are sorted. Arrays are described by their first element only.
pub fn infer_schema(payload: &Value) -> Vec<SchemaField> {
    match payload {
        Value::Object(map) => infer_object(map),
        Value::Array(items) => items.first().map(infer_element).unwrap_or_default(),
        other => vec![infer_field(ROOT_FIELD, other)],
    }
}

fn infer_object(map: &Map<String, Value>) -> Vec<SchemaField> {
    let mut fields: Vec<SchemaField> = map.iter().map(|(k, v)| infer_field(k, v)).collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

fn infer_element(first: &Value) -> Vec<SchemaField> {
    match first {
        Value::Object(map) => infer_object(map),
        other => vec![infer_field(ARRAY_ITEM_FIELD, other)],
    }
}

fn infer_field(name: &str, value: &Value) -> SchemaField {
    let fields = match value {
        Value::Object(map) => Some(infer_object(map)),
        Value::Array(items) => Some(items.first().map(infer_element).unwrap_or_default()),
        _ => None,
    };
    SchemaField {
        name: name.to_string(),
        field_type: classify(value),
        required: true,
        nullable: value.is_null(),
        fields,
    }
}

fn classify(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::String(s) if is_iso_date(s) => FieldType::Date,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::Array,
        Value::Object(_) => FieldType::Object,
    }
}

/// ISO-8601 calendar dates and date-times (with or without offset).
fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 10 || !bytes[..4].iter().all(u8::is_ascii_digit) || bytes[4] != b'-' {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Hash over the field tree only. Independent of field order, ids and timestamps.
pub fn schema_hash(fields: &[SchemaField]) -> String {
    let mut canonical = String::new();
    write_canonical(fields, &mut canonical);
    compute_hash(&canonical)
}

fn write_canonical(fields: &[SchemaField], out: &mut String) {
    let mut sorted: Vec<&SchemaField> = fields.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    out.push('{');
    for field in sorted {
        let _ = write!(
            out,
            "{:?}:{}:{}:{}",
            field.name, field.field_type, field.required, field.nullable
        );
        if let Some(children) = &field.fields {
            write_canonical(children, out);
        }
        out.push(',');
    }
    out.push('}');
}

/// A versioned, hashed schema for one provider and schema name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub id: Uuid,
    pub provider: String,
    pub schema_name: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub fields: Vec<SchemaField>,
    pub hash: String,
}

impl SchemaSnapshot {
    pub fn new(
        provider: impl Into<String>,
        schema_name: impl Into<String>,
        version: u32,
        fields: Vec<SchemaField>,
    ) -> Self {
        let hash = schema_hash(&fields);
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            schema_name: schema_name.into(),
            version,
            created_at: Utc::now(),
            fields,
            hash,
        }
    }

    /// Snapshot of `payload` at version 1.
    pub fn from_payload(provider: &str, schema_name: &str, payload: &Value) -> Self {
        Self::new(provider, schema_name, 1, infer_schema(payload))
    }

    /// True if the stored hash still matches the field tree.
    pub fn verify_integrity(&self) -> bool {
        schema_hash(&self.fields) == self.hash
    }
}

/// Drift severity, ordered from harmless to breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DriftSeverity::None => "none",
            DriftSeverity::Low => "low",
            DriftSeverity::Medium => "medium",
            DriftSeverity::High => "high",
            DriftSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedField {
    pub path: String,
    pub old_type: FieldType,
    pub new_type: FieldType,
}

/// Structural difference between a baseline and a current schema.
///
/// Paths are dotted (`scoreboard.games`), array elements add `[]`
/// (`scoreboard.games[].gameId`). Descendants of an added or removed field
/// are not listed separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedField>,
}

struct FlatField {
    field_type: FieldType,
    parent: Option<String>,
}

impl SchemaDiff {
    pub fn compute(baseline: &[SchemaField], current: &[SchemaField]) -> Self {
        let old = flatten(baseline);
        let new = flatten(current);

        let added_all: BTreeSet<&String> = new.keys().filter(|p| !old.contains_key(*p)).collect();
        let removed_all: BTreeSet<&String> = old.keys().filter(|p| !new.contains_key(*p)).collect();

        let added = added_all
            .iter()
            .filter(|p| !has_ancestor_in(p.as_str(), &new, &added_all))
            .map(|p| (*p).clone())
            .collect();
        let removed = removed_all
            .iter()
            .filter(|p| !has_ancestor_in(p.as_str(), &old, &removed_all))
            .map(|p| (*p).clone())
            .collect();
        let modified = old
            .iter()
            .filter_map(|(path, before)| {
                let after = new.get(path)?;
                (before.field_type != after.field_type).then(|| ModifiedField {
                    path: path.clone(),
                    old_type: before.field_type,
                    new_type: after.field_type,
                })
            })
            .collect();

        Self {
            added,
            removed,
            modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Removed beats modified beats added.
    pub fn severity(&self) -> DriftSeverity {
        if !self.removed.is_empty() {
            DriftSeverity::Critical
        } else if !self.modified.is_empty() {
            DriftSeverity::High
        } else if self.added.len() > MEDIUM_ADDED_FIELDS_THRESHOLD {
            DriftSeverity::Medium
        } else if !self.added.is_empty() {
            DriftSeverity::Low
        } else {
            DriftSeverity::None
        }
    }
}

fn flatten(fields: &[SchemaField]) -> BTreeMap<String, FlatField> {
    let mut out = BTreeMap::new();
    flatten_into(fields, None, &mut out);
    out
}

fn flatten_into(
    fields: &[SchemaField],
    parent: Option<&str>,
    out: &mut BTreeMap<String, FlatField>,
) {
    for field in fields {
        let path = match (parent, field.name.as_str()) {
            (Some(p), ARRAY_ITEM_FIELD) if p.ends_with("[]") => p.to_string(),
            (Some(p), name) => format!("{p}.{name}"),
            (None, name) => name.to_string(),
        };
        // An array element reuses its array's "[]" path; key it apart from the array itself.
        let path = if out.contains_key(&path) {
            format!("{path}.{}", field.name)
        } else {
            path
        };

        out.insert(
            path.clone(),
            FlatField {
                field_type: field.field_type,
                parent: parent.map(str::to_string),
            },
        );

        if let Some(children) = &field.fields {
            let child_prefix = if field.field_type == FieldType::Array {
                format!("{path}[]")
            } else {
                path.clone()
            };
            flatten_into(children, Some(&child_prefix), out);
        }
    }
}

fn has_ancestor_in(
    path: &str,
    index: &BTreeMap<String, FlatField>,
    set: &BTreeSet<&String>,
) -> bool {
    let mut current = index.get(path).and_then(|f| f.parent.clone());
    while let Some(prefix) = current {
        let owner = prefix.strip_suffix("[]").unwrap_or(&prefix).to_string();
        if set.contains(&owner) {
            return true;
        }
        current = index.get(&owner).and_then(|f| f.parent.clone());
    }
    false
}

/// Outcome of one drift check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftDetectionResult {
    pub detected: bool,
    pub severity: DriftSeverity,
    pub diff: SchemaDiff,
    /// The baseline compared against; the freshly stored one on bootstrap.
    pub baseline: Option<SchemaSnapshot>,
    pub current: SchemaSnapshot,
    /// True when this check created the first baseline.
    pub bootstrapped: bool,
    pub detected_at: DateTime<Utc>,
    pub correlation_id: String,
}

/// Compares live payloads against persisted baselines.
#[derive(Clone)]
pub struct SchemaDriftDetector<S: BaselineStore> {
    store: S,
}

impl<S: BaselineStore> SchemaDriftDetector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn snapshot(&self, provider: &str, schema_name: &str, payload: &Value) -> SchemaSnapshot {
        SchemaSnapshot::from_payload(provider, schema_name, payload)
    }

    /// Diff `payload` against the stored baseline. Stores the first
    /// observation as the baseline; never modifies an existing one.
    pub async fn detect_drift(
        &self,
        provider: &str,
        schema_name: &str,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<DriftDetectionResult, AppError> {
        let mut current = self.snapshot(provider, schema_name, payload);

        let Some(baseline) = self.store.load(provider, schema_name).await? else {
            self.store.save(&current).await?;
            tracing::info!(
                provider = %provider,
                schema = %schema_name,
                hash = %current.hash,
                correlation_id = %correlation_id,
                "Recorded initial schema baseline"
            );
            return Ok(DriftDetectionResult {
                detected: false,
                severity: DriftSeverity::None,
                diff: SchemaDiff::default(),
                baseline: Some(current.clone()),
                current,
                bootstrapped: true,
                detected_at: Utc::now(),
                correlation_id: correlation_id.to_string(),
            });
        };

        if !baseline.verify_integrity() {
            tracing::warn!(
                provider = %provider,
                schema = %schema_name,
                "Stored baseline hash does not match its fields"
            );
        }
        current.version = baseline.version;

        let diff = if baseline.hash == current.hash {
            SchemaDiff::default()
        } else {
            SchemaDiff::compute(&baseline.fields, &current.fields)
        };
        let severity = diff.severity();
        let detected = !diff.is_empty();

        if detected {
            tracing::warn!(
                provider = %provider,
                schema = %schema_name,
                severity = %severity,
                added = diff.added.len(),
                removed = diff.removed.len(),
                modified = diff.modified.len(),
                correlation_id = %correlation_id,
                "Schema drift detected"
            );
        }

        Ok(DriftDetectionResult {
            detected,
            severity,
            diff,
            baseline: Some(baseline),
            current,
            bootstrapped: false,
            detected_at: Utc::now(),
            correlation_id: correlation_id.to_string(),
        })
    }

    /// Replace the baseline with the schema of `payload`, bumping the version.
    pub async fn rebaseline(
        &self,
        provider: &str,
        schema_name: &str,
        payload: &Value,
    ) -> Result<SchemaSnapshot, AppError> {
        let previous = self.store.load(provider, schema_name).await?;
        let version = previous.as_ref().map(|b| b.version + 1).unwrap_or(1);
        let snapshot = SchemaSnapshot::new(provider, schema_name, version, infer_schema(payload));
        self.store.save(&snapshot).await?;

        tracing::info!(
            provider = %provider,
            schema = %schema_name,
            version,
            hash = %snapshot.hash,
            "Schema baseline replaced"
        );
        Ok(snapshot)
    }

    pub async fn get_baseline(
        &self,
        provider: &str,
        schema_name: &str,
    ) -> Result<Option<SchemaSnapshot>, AppError> {
        self.store.load(provider, schema_name).await
    }

    pub async fn list_baselines(&self) -> Result<Vec<SchemaSnapshot>, AppError> {
        self.store.list().await
    }

    pub async fn delete_baseline(&self, provider: &str, schema_name: &str) -> Result<bool, AppError> {
        let deleted = self.store.delete(provider, schema_name).await?;
        if deleted {
            tracing::info!(provider = %provider, schema = %schema_name, "Schema baseline deleted");
        }
        Ok(deleted)
    }
}
