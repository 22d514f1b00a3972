//! Fixed-contract payload validation.
//!
//! A [`Contract`] is a compiled JSON Schema that a provider's (normalized)
//! payload must satisfy. Unlike drift detection it is a hard gate: a
//! violation fails the ingestion call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AppError;

/// Violations reported per failed validation.
const MAX_REPORTED_VIOLATIONS: usize = 5;

/// A compiled validation contract.
#[derive(Clone)]
pub struct Contract {
    name: String,
    schema: serde_json::Value,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Contract {
    pub fn compile(name: impl Into<String>, schema: serde_json::Value) -> Result<Self, AppError> {
        let name = name.into();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            AppError::SchemaError(format!("Contract '{name}' is not a valid JSON Schema: {e}"))
        })?;
        Ok(Self {
            name,
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    pub fn is_valid(&self, payload: &serde_json::Value) -> bool {
        self.validator.is_valid(payload)
    }

    /// Validate `payload`, collecting up to five violations into the error message.
    pub fn validate(&self, payload: &serde_json::Value) -> Result<(), AppError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(payload)
            .take(MAX_REPORTED_VIOLATIONS)
            .map(|e| e.to_string())
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(AppError::SchemaValidationError(format!(
                "payload violates contract '{}': {}",
                self.name,
                violations.join("; ")
            )))
        }
    }
}

/// Loads contracts from a schema directory.
///
/// Layout: `<dir>/<name>/<version>.json`, with `<dir>/registry.json` mapping
/// each name to its latest version.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    dir: PathBuf,
}

impl ContractRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and compile a contract.
    ///
    /// `reference` is a file path (absolute, or relative to the schema
    /// directory), `name@version`, or `name@latest`.
    pub fn resolve(&self, reference: &str) -> Result<Contract, AppError> {
        let (path, name) = self.locate(reference)?;

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::SchemaError(format!("Cannot read contract {}: {e}", path.display()))
        })?;
        let schema: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            AppError::SchemaError(format!("Contract {} is not valid JSON: {e}", path.display()))
        })?;

        tracing::debug!(contract = %name, path = %path.display(), "Loaded validation contract");
        Contract::compile(name, schema)
    }

    fn locate(&self, reference: &str) -> Result<(PathBuf, String), AppError> {
        if let Some((name, version)) = reference.split_once('@') {
            if name.is_empty() || version.is_empty() || name.contains(['/', '\\']) {
                return Err(AppError::SchemaError(format!(
                    "Contract reference must look like name@version, got '{reference}'"
                )));
            }
            let version = if version == "latest" {
                self.latest_version(name)?
            } else {
                version.to_string()
            };
            let path = self.dir.join(name).join(format!("{version}.json"));
            if !path.is_file() {
                return Err(AppError::SchemaError(format!(
                    "Contract {name}@{version} not found at {}",
                    path.display()
                )));
            }
            return Ok((path, format!("{name}@{version}")));
        }

        let given = PathBuf::from(reference);
        let path = if given.is_absolute() || given.is_file() {
            given
        } else {
            self.dir.join(given)
        };
        if !path.is_file() {
            return Err(AppError::SchemaError(format!(
                "Contract file not found: {}",
                path.display()
            )));
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("contract")
            .to_string();
        Ok((path, name))
    }

    fn latest_version(&self, name: &str) -> Result<String, AppError> {
        let path = self.dir.join("registry.json");
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::SchemaError(format!("Cannot read contract registry {}: {e}", path.display()))
        })?;
        let registry: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| AppError::SchemaError(format!("Contract registry is not valid JSON: {e}")))?;
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::SchemaError(format!("Contract registry has no entry for '{name}'")))
    }
}
