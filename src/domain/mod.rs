//! Strongly-typed values the runtime configuration is built from.
use std::fmt;

use actix_web::cookie::Key;
use thiserror::Error;

/// Minimum secret length accepted for cookie key derivation.
pub const MIN_SECRET_KEY_LEN: usize = 32;

/// Entry of the host allow-list.
///
/// Patterns are stored lowercase. `*` accepts any host, a leading dot
/// (`.onrender.com`) accepts the bare domain and every subdomain, anything
/// else must match exactly.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct HostPattern(String);

impl HostPattern {
    pub fn try_new(value: impl Into<String>) -> Result<Self, TypeConstraintError> {
        let value = value.into().trim().to_ascii_lowercase();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(TypeConstraintError::InvalidHostPattern(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check a raw `Host` header value (port allowed) against the pattern.
    pub fn matches(&self, host: &str) -> bool {
        let Some(domain) = host_domain(host) else {
            return false;
        };
        let pattern = self.0.as_str();

        if pattern == "*" {
            return true;
        }
        match pattern.strip_prefix('.') {
            Some(bare) => domain.ends_with(pattern) || domain == bare,
            None => domain == pattern,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Extract the lowercase domain from a `Host` header value.
///
/// Returns `None` for values that are not a valid host, e.g. a non-numeric
/// port or an unbracketed IPv6 literal. A single trailing dot is dropped and
/// an empty port (`localhost:`) counts as no port.
pub fn host_domain(host: &str) -> Option<String> {
    let host = host.trim().to_ascii_lowercase();

    let domain = if host.starts_with('[') {
        let end = host.find(']')?;
        let (literal, rest) = host.split_at(end + 1);
        if !rest.is_empty() && !is_port_suffix(rest) {
            return None;
        }
        let inner = &literal[1..literal.len() - 1];
        if !inner.contains(':')
            || !inner
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
        {
            return None;
        }
        literal
    } else {
        let domain = match host.rfind(':') {
            Some(idx) if is_port_suffix(&host[idx..]) => &host[..idx],
            Some(_) => return None,
            None => host.as_str(),
        };
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return None;
        }
        domain
    };

    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_string())
}

fn is_port_suffix(value: &str) -> bool {
    match value.strip_prefix(':') {
        Some(port) => port.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Secret used to sign session and message cookies. Never printed.
#[derive(Clone, Eq, PartialEq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn try_new(value: String) -> Result<Self, TypeConstraintError> {
        if value.is_empty() {
            return Err(TypeConstraintError::EmptySecret);
        }
        if value.len() < MIN_SECRET_KEY_LEN {
            return Err(TypeConstraintError::ShortSecret { len: value.len() });
        }
        Ok(Self(value))
    }

    /// Cookie signing key derived from the secret.
    pub fn cookie_key(&self) -> Key {
        Key::derive_from(self.0.as_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(**redacted**)")
    }
}

/// Verbosity of the application's own loggers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[derive(Debug, Error)]
pub enum TypeConstraintError {
    #[error("invalid host pattern `{0}`")]
    InvalidHostPattern(String),
    #[error("secret is empty")]
    EmptySecret,
    #[error("secret is too short ({len} bytes)")]
    ShortSecret { len: usize },
}
