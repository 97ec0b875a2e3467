//! Traffic simulation with hping3
//!
//! Each rule is checked by sending a single crafted packet and reading
//! hping3's console output. The output is reduced to an [`Observation`]
//! by ordered substring checks:
//!
//! 1. `flags=SA` on stdout (SYN/ACK came back) - allowed
//! 2. `Operation not permitted` on stderr (local filter refused the send) - blocked
//! 3. `ICMP Packet received` on stdout - allowed
//! 4. anything else - blocked
//!
//! hping3's exit status is not consulted: it exits non-zero whenever no
//! reply arrived, which is the normal outcome for blocked traffic.

use crate::core::error::{Error, Result};
use crate::core::rules::{Action, Direction, Protocol, Rule};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

/// Default probe destination: traffic is tested against the local stack
pub const DEFAULT_TARGET: &str = "127.0.0.1";

/// Default upper bound on a single hping3 run
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw verdict of one probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Observation {
    #[strum(serialize = "allowed")]
    Allowed,
    #[strum(serialize = "blocked")]
    Blocked,
}

impl Observation {
    /// Maps the observation onto the declared-action vocabulary
    pub const fn normalized(self) -> Action {
        match self {
            Observation::Allowed => Action::Allow,
            Observation::Blocked => Action::Block,
        }
    }
}

/// hping3 mode flag for a protocol
pub const fn protocol_flag(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "-S", // TCP SYN
        Protocol::Udp => "--udp",
        Protocol::Icmp => "--icmp",
    }
}

/// Builds the hping3 argument list for a rule.
///
/// Inbound rules target the rule's port as destination; outbound rules
/// send from the rule's port as source.
pub fn probe_args(target: &str, rule: &Rule) -> Vec<String> {
    let flag = protocol_flag(rule.protocol).to_string();
    let port = rule.port.to_string();

    match rule.direction {
        Direction::Inbound => vec![
            target.to_string(),
            flag,
            "-p".to_string(),
            port,
            "-c".to_string(),
            "1".to_string(),
        ],
        Direction::Outbound => vec![
            "-c".to_string(),
            "1".to_string(),
            "-s".to_string(),
            port,
            target.to_string(),
            flag,
        ],
    }
}

/// Reduces hping3 output to an observation.
pub fn classify(stdout: &str, stderr: &str) -> Observation {
    if stdout.contains("flags=SA") {
        Observation::Allowed
    } else if stderr.contains("Operation not permitted") {
        Observation::Blocked
    } else if stdout.contains("ICMP Packet received") {
        Observation::Allowed
    } else {
        Observation::Blocked
    }
}

/// Source of observations for rules
///
/// The validator only depends on this trait; [`Hping3Probe`] is the
/// implementation that sends real traffic.
pub trait TrafficProbe {
    /// Sends test traffic for `rule` and reports what happened to it.
    fn probe(&self, rule: &Rule) -> impl Future<Output = Result<Observation>> + Send;
}

/// Probe backed by an (elevated) hping3 process per rule
#[derive(Debug, Clone)]
pub struct Hping3Probe {
    target: String,
    timeout: Duration,
}

impl Default for Hping3Probe {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET, DEFAULT_PROBE_TIMEOUT)
    }
}

impl Hping3Probe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Argument list this probe would run for `rule`
    pub fn args_for(&self, rule: &Rule) -> Vec<String> {
        probe_args(&self.target, rule)
    }
}

impl TrafficProbe for Hping3Probe {
    async fn probe(&self, rule: &Rule) -> Result<Observation> {
        let args = self.args_for(rule);
        debug!(
            "Probing rule {}: {}",
            rule.rule_id,
            crate::elevation::Tool::Hping3.command_line(&args)
        );

        let mut cmd = crate::elevation::create_elevated_hping3_command(&args)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Probe {
                    rule_id: rule.rule_id,
                    message: format!("Failed to run hping3: {e}"),
                });
            }
            Err(_) => {
                return Err(Error::Probe {
                    rule_id: rule.rule_id,
                    message: format!("hping3 timed out after {:?}", self.timeout),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            rule_id = rule.rule_id,
            exit_code = ?output.status.code(),
            stdout = %stdout.trim(),
            stderr = %stderr.trim(),
            "hping3 finished"
        );

        let observation = classify(&stdout, &stderr);
        info!("Rule {} observed as {observation}", rule.rule_id);
        Ok(observation)
    }
}
