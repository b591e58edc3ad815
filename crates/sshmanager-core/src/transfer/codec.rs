//! Plaintext export/import encoding of connection documents.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, StoreError};
use crate::model::{ConnectionRecord, ConnectionStoreDocument};

/// Encoding of an export, import, or backup file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferFormat {
    Yaml,
    Json,
    /// Decide from the file extension, then by trying JSON before YAML.
    #[default]
    Auto,
}

impl TransferFormat {
    /// Parse `yaml`, `yml`, `json`, or `auto`. Blank means `auto`.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(TransferFormat::Auto),
            "yaml" | "yml" => Ok(TransferFormat::Yaml),
            "json" => Ok(TransferFormat::Json),
            other => Err(StoreError::Validation(format!(
                "unknown format {:?} (use auto, yaml, or json)",
                other
            ))),
        }
    }

    /// Narrow `Auto` using the extension of `path`, if any.
    pub fn resolve(self, path: Option<&Path>) -> Self {
        if self != TransferFormat::Auto {
            return self;
        }
        let extension = path
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => TransferFormat::Json,
            Some("yaml") | Some("yml") => TransferFormat::Yaml,
            _ => TransferFormat::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferFormat::Yaml => "yaml",
            TransferFormat::Json => "json",
            TransferFormat::Auto => "auto",
        }
    }
}

impl FromStr for TransferFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize `value` as YAML, or as pretty JSON with a trailing newline.
///
/// `Auto` encodes as YAML.
pub(crate) fn encode_value<T: serde::Serialize>(
    value: &T,
    format: TransferFormat,
) -> Result<String> {
    match format {
        TransferFormat::Json => {
            let mut encoded = serde_json::to_string_pretty(value)?;
            encoded.push('\n');
            Ok(encoded)
        }
        TransferFormat::Yaml | TransferFormat::Auto => Ok(serde_yaml::to_string(value)?),
    }
}

/// Encode `document` for export.
pub fn encode_document(document: &ConnectionStoreDocument, format: TransferFormat) -> Result<String> {
    encode_value(document, format)
}

/// Decode an export or import file.
///
/// Both the `{version, connections}` shape and a bare list of records are
/// accepted, in JSON or YAML. With `Auto` the format is taken from `path` when
/// it has a known extension, otherwise JSON is tried before YAML.
///
/// # Errors
///
/// Returns `StoreError::Validation` for empty input and `StoreError::Parse`
/// when the content cannot be decoded in the chosen format.
pub fn decode_document(
    data: &str,
    format: TransferFormat,
    path: Option<&Path>,
) -> Result<ConnectionStoreDocument> {
    if data.trim().is_empty() {
        return Err(StoreError::Validation("import file is empty".to_string()));
    }

    match format.resolve(path) {
        TransferFormat::Json => decode_json(data),
        TransferFormat::Yaml => decode_yaml(data),
        TransferFormat::Auto => decode_json(data).or_else(|_| decode_yaml(data)).map_err(|_| {
            StoreError::Parse("failed to decode import file as JSON or YAML".to_string())
        }),
    }
}

fn decode_json(data: &str) -> Result<ConnectionStoreDocument> {
    let trimmed = data.trim();
    let mut document = if trimmed.starts_with('[') {
        let records: Vec<ConnectionRecord> = serde_json::from_str(trimmed)
            .map_err(|e| StoreError::Parse(format!("failed to decode JSON list: {}", e)))?;
        ConnectionStoreDocument::from_records(records)
    } else {
        serde_json::from_str(trimmed)
            .map_err(|e| StoreError::Parse(format!("failed to decode JSON object: {}", e)))?
    };
    document.normalize_version();
    Ok(document)
}

fn decode_yaml(data: &str) -> Result<ConnectionStoreDocument> {
    ConnectionStoreDocument::parse(data)
}
