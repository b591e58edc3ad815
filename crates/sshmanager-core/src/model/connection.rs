//! A single remote host profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StoreError;

/// Port used when a record leaves `port` at zero.
pub const DEFAULT_SSH_PORT: u32 = 22;

/// Highest valid TCP port.
pub const MAX_PORT: u32 = 65_535;

/// How a connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Password,
    Key,
    Agent,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Password => "password",
            AuthMode::Key => "key",
            AuthMode::Agent => "agent",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "password" => Ok(AuthMode::Password),
            "key" => Ok(AuthMode::Key),
            "agent" => Ok(AuthMode::Agent),
            other => Err(StoreError::Validation(format!(
                "unsupported auth mode {:?}, expected password, key, or agent",
                other
            ))),
        }
    }
}

/// Unknown or malformed modes decode as absent so they can be inferred later.
fn lenient_auth_mode<'de, D>(deserializer: D) -> Result<Option<AuthMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

/// Explicit nulls (`alias:` in YAML, `"alias": null` in JSON) decode as the
/// field's empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero(port: &u32) -> bool {
    *port == 0
}

/// One remote host profile as persisted in the connection document.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub alias: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(deserialize_with = "null_as_default")]
    pub host: String,
    /// Zero means the SSH default. Wider than a TCP port so that an
    /// out-of-range value reaches validation instead of failing the decode.
    #[serde(skip_serializing_if = "is_zero", deserialize_with = "null_as_default")]
    pub port: u32,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_auth_mode"
    )]
    pub auth_mode: Option<AuthMode>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub identity_file: String,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub proxy_jump: String,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub local_forwards: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub remote_forwards: Vec<String>,
    #[serde(
        rename = "extraSSHArgs",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub extra_args: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub group: String,
    #[serde(skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub description: String,
}

impl ConnectionRecord {
    /// Minimal record for `username@host`.
    pub fn new(username: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Port to dial; zero means the SSH default.
    pub fn effective_port(&self) -> u32 {
        if self.port == 0 {
            DEFAULT_SSH_PORT
        } else {
            self.port
        }
    }

    /// Explicit auth mode, or one inferred from which secret is populated.
    pub fn effective_auth_mode(&self) -> AuthMode {
        resolve_auth_mode(self.auth_mode, &self.password, &self.identity_file)
    }

    /// `username@host` target string.
    pub fn target(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Password wins over identity file; neither means the agent.
pub fn resolve_auth_mode(
    explicit: Option<AuthMode>,
    password: &str,
    identity_file: &str,
) -> AuthMode {
    if let Some(mode) = explicit {
        return mode;
    }
    if !password.trim().is_empty() {
        AuthMode::Password
    } else if !identity_file.trim().is_empty() {
        AuthMode::Key
    } else {
        AuthMode::Agent
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() {
            ""
        } else {
            "[REDACTED]"
        };
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_mode", &self.auth_mode)
            .field("password", &password)
            .field("identity_file", &self.identity_file)
            .field("proxy_jump", &self.proxy_jump)
            .field("local_forwards", &self.local_forwards)
            .field("remote_forwards", &self.remote_forwards)
            .field("extra_args", &self.extra_args)
            .field("group", &self.group)
            .field("tags", &self.tags)
            .field("description", &self.description)
            .finish()
    }
}
