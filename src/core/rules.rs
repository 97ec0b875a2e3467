//! Declared firewall rules and rule-file loading
//!
//! A rule file is a JSON array of objects:
//!
//! ```json
//! [
//!     {"rule_id": 1, "direction": "incoming", "protocol": "tcp", "port": 22, "action": "allow"},
//!     {"rule_id": 2, "direction": "outgoing", "protocol": "udp", "port": 53, "action": "block"}
//! ]
//! ```
//!
//! Directions are written `incoming`/`outgoing`; `inbound`/`outbound` are
//! accepted on input. Ports outside 0-65535 and unknown enum values are
//! rejected at parse time.
//!
//! # Limits
//!
//! Rule files are limited to [`MAX_RULES`] rules.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Maximum number of rules accepted from a single rule file
///
/// Every rule costs one iptables invocation and one probe round-trip.
pub const MAX_RULES: usize = 1000;

/// Traffic direction a rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
)]
pub enum Direction {
    /// Traffic arriving at this host (iptables INPUT chain)
    #[serde(rename = "incoming", alias = "inbound")]
    #[strum(serialize = "incoming")]
    Inbound,
    /// Traffic leaving this host (iptables OUTPUT chain)
    #[serde(rename = "outgoing", alias = "outbound")]
    #[strum(serialize = "outgoing")]
    Outbound,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "incoming",
            Direction::Outbound => "outgoing",
        }
    }
}

/// Network protocol of a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Internet Control Message Protocol (IPv4)
    #[strum(serialize = "icmp")]
    Icmp,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Whether the protocol carries port numbers
    pub const fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// Declared or observed verdict for a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Traffic should pass
    #[strum(serialize = "allow")]
    Allow,
    /// Traffic should be dropped
    #[strum(serialize = "block")]
    Block,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
        }
    }
}

/// A single declared firewall rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub rule_id: u32,
    pub direction: Direction,
    pub protocol: Protocol,
    pub port: u16,
    pub action: Action,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} {}",
            self.direction, self.protocol, self.port, self.action
        )
    }
}

/// Parses a rule file body and checks rule-set level constraints.
///
/// # Errors
///
/// Returns `Err` if:
/// - The JSON is malformed or a field has an invalid value
/// - The file holds more than [`MAX_RULES`] rules
/// - Two rules share a `rule_id`
pub fn parse_rules(json: &str) -> Result<Vec<Rule>> {
    let rules: Vec<Rule> = serde_json::from_str(json)?;

    if rules.len() > MAX_RULES {
        return Err(Error::Validation {
            field: "rules".to_string(),
            message: format!("{} rules exceeds the limit of {MAX_RULES}", rules.len()),
        });
    }

    let mut seen = HashSet::with_capacity(rules.len());
    for rule in &rules {
        if !seen.insert(rule.rule_id) {
            return Err(Error::Validation {
                field: "rule_id".to_string(),
                message: format!("duplicate rule_id {}", rule.rule_id),
            });
        }
    }

    Ok(rules)
}

/// Identity of a rule file: where it lives and what it contained
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSource {
    /// Canonical (absolute, symlink-free) path
    pub path: PathBuf,
    /// SHA-256 of the file content, lowercase hex
    pub checksum: String,
}

/// Rules loaded from a file together with the file's identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    pub source: RuleSource,
    pub rules: Vec<Rule>,
}

/// Computes the SHA-256 checksum of a rule file's content.
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Loads firewall rules from a JSON file.
///
/// # Errors
///
/// Returns [`Error::RuleFile`] if the file cannot be read or parsed, and
/// [`Error::Validation`] if the rule set breaks a constraint.
pub async fn load_rules(path: &Path) -> Result<RuleSet> {
    let rule_file_error = |e: &dyn fmt::Display| {
        error!("Failed to load rules file {}: {e}", path.display());
        Error::RuleFile {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    };

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| rule_file_error(&e))?;
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| rule_file_error(&e))?;

    let rules = parse_rules(&content).map_err(|e| match e {
        Error::Serialization(e) => rule_file_error(&e),
        other => {
            error!("Failed to load rules file {}: {other}", path.display());
            other
        }
    })?;

    debug!("Loaded {} rules from {}", rules.len(), canonical.display());
    Ok(RuleSet {
        source: RuleSource {
            path: canonical,
            checksum: content_checksum(&content),
        },
        rules,
    })
}
