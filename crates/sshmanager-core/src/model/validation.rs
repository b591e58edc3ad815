//! Field grammars for connection records.
//!
//! These checks guard what ends up on an `ssh` command line: proxy-jump hop
//! chains, port-forward specs, pass-through arguments, and the group/tag
//! labels used for filtering.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, StoreError};

/// Maximum characters in a group name.
pub const MAX_GROUP_LENGTH: usize = 64;

/// Maximum characters per tag.
pub const MAX_TAG_LENGTH: usize = 64;

static PROXY_JUMP_HOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[^@\s,]+@)?(?:\[[^\]\s,]+\]|[^:@\s,]+)(?::(\d{1,5}))?$")
        .expect("proxy jump pattern is valid")
});

static FORWARD_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([^:\s]+):)?(\d{1,5}):([^:\s]+|\[[^\]\s]+\]):(\d{1,5})$")
        .expect("forward spec pattern is valid")
});

static SSH_OPTION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("option key pattern is valid"));

static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").expect("label pattern is valid"));

/// Flags accepted on their own in extra arguments.
pub const ALLOWED_STANDALONE_ARGS: &[&str] = &[
    "-4", "-6", "-A", "-a", "-C", "-g", "-K", "-k", "-N", "-n", "-q", "-T", "-t", "-v", "-vv",
    "-vvv", "-X", "-x", "-Y",
];

/// `-o` keys that would override settings the record manages itself.
pub const BLOCKED_OPTION_KEYS: &[&str] = &[
    "identityfile",
    "localcommand",
    "localforward",
    "permitlocalcommand",
    "port",
    "proxycommand",
    "proxyjump",
    "remoteforward",
];

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::Validation(message.into())
}

fn has_whitespace(value: &str) -> bool {
    value.chars().any(char::is_whitespace)
}

fn valid_port(digits: &str) -> bool {
    matches!(digits.parse::<u32>(), Ok(port) if (1..=65535).contains(&port))
}

/// Trim every entry and drop the blank ones.
pub fn normalize_string_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized list with case-insensitive duplicates removed.
///
/// The first spelling of each tag wins and order is preserved.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tags.len());
    normalize_string_list(tags)
        .into_iter()
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}

/// Validate a comma-separated proxy-jump chain. Blank is allowed.
pub fn validate_proxy_jump(proxy_jump: &str) -> Result<()> {
    let trimmed = proxy_jump.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if has_whitespace(trimmed) {
        return Err(invalid("proxy jump cannot contain whitespace"));
    }

    for hop in trimmed.split(',') {
        if hop.is_empty() {
            return Err(invalid("proxy jump cannot contain empty hops"));
        }
        let captures = PROXY_JUMP_HOP
            .captures(hop)
            .ok_or_else(|| invalid(format!("invalid proxy jump hop {:?}", hop)))?;
        if let Some(port) = captures.get(1) {
            if !valid_port(port.as_str()) {
                return Err(invalid(format!("invalid proxy jump port in {:?}", hop)));
            }
        }
    }
    Ok(())
}

/// Validate one `[bind_address:]port:host:hostport` forward spec.
pub fn validate_forward_spec(spec: &str) -> Result<()> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(invalid("forward spec cannot be empty"));
    }
    if has_whitespace(trimmed) {
        return Err(invalid(format!(
            "forward spec cannot contain whitespace: {:?}",
            trimmed
        )));
    }

    let captures = FORWARD_SPEC.captures(trimmed).ok_or_else(|| {
        invalid(format!(
            "invalid forward spec {:?}, expected [bind_address:]port:host:hostport",
            trimmed
        ))
    })?;
    if !valid_port(&captures[2]) {
        return Err(invalid(format!(
            "invalid local port in forward spec {:?}",
            trimmed
        )));
    }
    if !valid_port(&captures[4]) {
        return Err(invalid(format!(
            "invalid remote port in forward spec {:?}",
            trimmed
        )));
    }
    Ok(())
}

pub fn validate_forward_specs(specs: &[String]) -> Result<()> {
    specs.iter().try_for_each(|spec| validate_forward_spec(spec))
}

/// Validate pass-through `ssh` arguments.
///
/// Accepts the standalone flags in [`ALLOWED_STANDALONE_ARGS`] and
/// `-o key=value` options (as two tokens, or fused as `-okey=value` /
/// `-o=key=value`) whose key is not in [`BLOCKED_OPTION_KEYS`].
pub fn validate_extra_args(args: &[String]) -> Result<()> {
    let normalized = normalize_string_list(args);
    let mut tokens = normalized.iter();
    while let Some(arg) = tokens.next() {
        if arg == "-o" {
            let option = tokens
                .next()
                .ok_or_else(|| invalid("extra ssh arg -o requires a key=value token"))?;
            validate_option_token(option)?;
        } else if let Some(fused) = arg.strip_prefix("-o") {
            validate_option_token(fused.strip_prefix('=').unwrap_or(fused))?;
        } else if !ALLOWED_STANDALONE_ARGS.contains(&arg.as_str()) {
            return Err(invalid(format!("unsupported extra ssh argument {:?}", arg)));
        }
    }
    Ok(())
}

fn validate_option_token(option: &str) -> Result<()> {
    let (key, _) = option
        .trim()
        .split_once('=')
        .ok_or_else(|| invalid(format!("ssh option {:?} must be in key=value format", option)))?;

    let key = key.trim();
    if !SSH_OPTION_KEY.is_match(key) {
        return Err(invalid(format!("ssh option key {:?} is invalid", key)));
    }
    if BLOCKED_OPTION_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
        return Err(invalid(format!(
            "ssh option {:?} is not allowed in extra args",
            key
        )));
    }
    Ok(())
}

/// Validate a group name. Blank is allowed.
pub fn validate_group(group: &str) -> Result<()> {
    let trimmed = group.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.chars().count() > MAX_GROUP_LENGTH {
        return Err(invalid(format!(
            "group must be {} characters or fewer",
            MAX_GROUP_LENGTH
        )));
    }
    if !LABEL.is_match(trimmed) {
        return Err(invalid(
            "group may only contain letters, numbers, '.', '_', '/', or '-'",
        ));
    }
    Ok(())
}

/// Validate tags. Blank entries are skipped.
pub fn validate_tags(tags: &[String]) -> Result<()> {
    for tag in tags.iter().map(|tag| tag.trim()).filter(|tag| !tag.is_empty()) {
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(invalid(format!(
                "tag {:?} exceeds {} characters",
                tag, MAX_TAG_LENGTH
            )));
        }
        if !LABEL.is_match(tag) {
            return Err(invalid(format!(
                "tag {:?} may only contain letters, numbers, '.', '_', '/', or '-'",
                tag
            )));
        }
    }
    Ok(())
}
