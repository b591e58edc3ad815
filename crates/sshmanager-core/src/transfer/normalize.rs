//! Normalization of externally supplied records.

use crate::error::{Result, StoreError};
use crate::model::validation::{
    normalize_string_list, normalize_tags, validate_extra_args, validate_forward_specs,
    validate_group, validate_proxy_jump, validate_tags,
};
use crate::model::{AuthMode, ConnectionRecord, DEFAULT_SSH_PORT, MAX_PORT};

fn field_error(field: &str, err: StoreError) -> StoreError {
    match err {
        StoreError::Validation(message) => StoreError::Validation(format!(
            "imported connection has invalid {}: {}",
            field, message
        )),
        other => other,
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Clean up and validate a record coming from an import or backup file.
///
/// Text fields are trimmed, blank list entries dropped and tags
/// de-duplicated. The auth mode is resolved and stored explicitly, the secret
/// field the mode does not use is cleared, and an explicit port 22 is stored
/// as the default (zero).
///
/// # Errors
///
/// Returns `StoreError::Validation` naming the offending field.
pub fn normalize_record(mut record: ConnectionRecord) -> Result<ConnectionRecord> {
    trim_in_place(&mut record.username);
    trim_in_place(&mut record.host);
    trim_in_place(&mut record.proxy_jump);
    trim_in_place(&mut record.group);
    trim_in_place(&mut record.description);
    trim_in_place(&mut record.alias);
    trim_in_place(&mut record.identity_file);
    record.local_forwards = normalize_string_list(&record.local_forwards);
    record.remote_forwards = normalize_string_list(&record.remote_forwards);
    record.extra_args = normalize_string_list(&record.extra_args);
    record.tags = normalize_tags(&record.tags);

    if record.username.is_empty() {
        return Err(StoreError::Validation(
            "imported connection has empty username".to_string(),
        ));
    }
    if record.host.is_empty() {
        return Err(StoreError::Validation(
            "imported connection has empty host".to_string(),
        ));
    }
    if record.port > MAX_PORT {
        return Err(StoreError::Validation(format!(
            "imported connection has invalid port: {} is outside 1-{}",
            record.port, MAX_PORT
        )));
    }
    validate_proxy_jump(&record.proxy_jump).map_err(|e| field_error("proxyJump", e))?;
    validate_forward_specs(&record.local_forwards).map_err(|e| field_error("localForwards", e))?;
    validate_forward_specs(&record.remote_forwards)
        .map_err(|e| field_error("remoteForwards", e))?;
    validate_extra_args(&record.extra_args).map_err(|e| field_error("extraSSHArgs", e))?;
    validate_group(&record.group).map_err(|e| field_error("group", e))?;
    validate_tags(&record.tags).map_err(|e| field_error("tags", e))?;

    let mode = record.effective_auth_mode();
    record.auth_mode = Some(mode);
    match mode {
        AuthMode::Password => {
            record.identity_file.clear();
            if record.password.trim().is_empty() {
                return Err(StoreError::Validation(
                    "imported password auth connection is missing password".to_string(),
                ));
            }
        }
        AuthMode::Key => {
            record.password.clear();
            if record.identity_file.is_empty() {
                return Err(StoreError::Validation(
                    "imported key auth connection is missing identityFile".to_string(),
                ));
            }
        }
        AuthMode::Agent => {
            record.password.clear();
            record.identity_file.clear();
        }
    }

    if record.port == DEFAULT_SSH_PORT {
        record.port = 0;
    }
    Ok(record)
}
