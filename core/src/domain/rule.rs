//! Target rule domain model and its small configuration grammar.
//!
//! A rule entry is a `:`-separated list of up to three fields. Fields are
//! identified by shape, not position: an IPv4 address is the host, an
//! unsigned integer is the port, anything else is the name pattern.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::matcher;

/// Prefix accepted (and ignored) in front of a rule entry.
const RULE_PREFIX: char = '@';

/// Separator between the fields of one rule entry.
const FIELD_SEPARATOR: char = ':';

/// One configured export target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRule {
    /// Glob pattern matched against the process name.
    pub pattern: String,
    /// Forwarder port to bind instead of allocating one.
    pub explicit_port: Option<u16>,
    /// Local address to bind the forwarder on.
    pub explicit_host: Option<Ipv4Addr>,
}

/// Classification of a single rule field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleField<'a> {
    Host(Ipv4Addr),
    Port(u16),
    Pattern(&'a str),
}

/// Classify one trimmed, non-empty field: is-IPv4, then is-integer, else pattern.
pub fn classify_field(field: &str) -> std::result::Result<RuleField<'_>, String> {
    if let Ok(host) = field.parse::<Ipv4Addr>() {
        return Ok(RuleField::Host(host));
    }
    if field.bytes().all(|b| b.is_ascii_digit()) {
        return field
            .parse::<u16>()
            .map(RuleField::Port)
            .map_err(|_| format!("port '{}' is out of range", field));
    }
    Ok(RuleField::Pattern(field))
}

impl TargetRule {
    /// Create a rule matching `pattern` with no overrides.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            explicit_port: None,
            explicit_host: None,
        }
    }

    /// Parse one configuration entry such as `10.0.0.5:5001:worker-*`.
    ///
    /// Empty fields are ignored; a later field of the same kind replaces an
    /// earlier one. A port of `0` means "allocate one".
    pub fn parse(raw: &str) -> Result<Self> {
        let body = raw.trim();
        let body = body.strip_prefix(RULE_PREFIX).unwrap_or(body);

        let invalid = |reason: String| Error::InvalidRule {
            rule: raw.to_string(),
            reason,
        };

        let mut rule = TargetRule::new(String::new());
        let mut seen_any = false;

        for field in body.split(FIELD_SEPARATOR).map(str::trim) {
            if field.is_empty() {
                continue;
            }
            seen_any = true;
            match classify_field(field).map_err(invalid)? {
                RuleField::Host(host) => rule.explicit_host = Some(host),
                RuleField::Port(0) => rule.explicit_port = None,
                RuleField::Port(port) => rule.explicit_port = Some(port),
                RuleField::Pattern(pattern) => rule.pattern = pattern.to_string(),
            }
        }

        if !seen_any {
            return Err(invalid("entry has no fields".to_string()));
        }
        Ok(rule)
    }

    /// Split a comma-separated configuration string into raw entries.
    pub fn split_entries(config: &str) -> impl Iterator<Item = &str> {
        config.split(',').map(str::trim).filter(|e| !e.is_empty())
    }

    /// Check whether this rule selects the given process name.
    pub fn matches(&self, process_name: &str) -> bool {
        matcher::matches(process_name, &self.pattern)
    }
}

impl std::fmt::Display for TargetRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let host = self
            .explicit_host
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        let port = self
            .explicit_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "auto".to_string());
        let pattern = if self.pattern.is_empty() {
            "<none>"
        } else {
            self.pattern.as_str()
        };
        write!(f, "{}:{}:{}", host, port, pattern)
    }
}
