//! Rule application through iptables
//!
//! Each declared rule becomes one appended iptables rule in the filter table:
//!
//! ```text
//! iptables -A INPUT  -p tcp --dport 22 -j ACCEPT     (incoming allow)
//! iptables -A OUTPUT -p udp --dport 53 -j DROP       (outgoing block)
//! iptables -A INPUT  -p icmp -j ACCEPT               (no port match for ICMP)
//! ```
//!
//! Resetting flushes every chain with `iptables -F`.

use crate::core::error::{Error, Result};
use crate::core::rules::{Action, Direction, Rule};
use crate::elevation::Tool;
use std::process::Stdio;
use tracing::{error, info};

/// iptables chain a direction maps to
pub const fn chain_for(direction: Direction) -> &'static str {
    match direction {
        Direction::Inbound => "INPUT",
        Direction::Outbound => "OUTPUT",
    }
}

/// iptables jump target an action maps to
pub const fn target_for(action: Action) -> &'static str {
    match action {
        Action::Allow => "ACCEPT",
        Action::Block => "DROP",
    }
}

/// Builds the iptables argument list appending `rule`.
pub fn rule_args(rule: &Rule) -> Vec<String> {
    let mut args = vec![
        "-A".to_string(),
        chain_for(rule.direction).to_string(),
        "-p".to_string(),
        rule.protocol.as_str().to_string(),
    ];

    if rule.protocol.has_ports() {
        args.push("--dport".to_string());
        args.push(rule.port.to_string());
    }

    args.push("-j".to_string());
    args.push(target_for(rule.action).to_string());
    args
}

/// Argument list that flushes all rules
pub fn reset_args() -> Vec<String> {
    vec!["-F".to_string()]
}

/// Applies a single rule.
///
/// # Errors
///
/// Returns `Err` if elevation is unavailable, iptables cannot be spawned,
/// or iptables exits non-zero.
pub async fn apply_rule(rule: &Rule) -> Result<()> {
    info!("Applying rule {}: {rule}", rule.rule_id);
    run_iptables(&rule_args(rule)).await
}

/// Applies rules in order, stopping at the first failure.
///
/// Returns the number of rules applied.
///
/// # Errors
///
/// Returns the error of the first rule that failed; earlier rules stay applied.
pub async fn apply_all_rules(rules: &[Rule]) -> Result<usize> {
    for rule in rules {
        apply_rule(rule).await.inspect_err(|e| {
            error!("Rule {} could not be applied: {e}", rule.rule_id);
        })?;
    }
    info!("Applied {} rules", rules.len());
    Ok(rules.len())
}

/// Flushes all firewall rules.
///
/// # Errors
///
/// Returns `Err` if iptables cannot be run or exits non-zero.
pub async fn reset_firewall() -> Result<()> {
    info!("Flushing all iptables rules");
    run_iptables(&reset_args()).await?;
    info!("All firewall rules have been reset");
    Ok(())
}

async fn run_iptables(args: &[String]) -> Result<()> {
    let output = crate::elevation::create_elevated_iptables_command(args)?
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            error!("Failed to spawn iptables: {e}");
            Error::Iptables {
                message: format!("Failed to spawn iptables: {e}"),
                stderr: None,
                exit_code: None,
            }
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let errors = parse_iptables_errors(&stderr);
        let message = if errors.is_empty() {
            format!(
                "`{}` exited with {}",
                Tool::Iptables.command_line(args),
                output.status
            )
        } else {
            errors.join("; ")
        };
        error!("iptables failed: {message}");
        Err(Error::Iptables {
            message,
            stderr: Some(stderr),
            exit_code: output.status.code(),
        })
    }
}

/// Parses iptables error output into user-friendly messages
///
/// Drops the usage hint iptables appends and strips the program prefix.
fn parse_iptables_errors(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Try `iptables"))
        .map(|line| match line.split_once(": ") {
            Some((prefix, rest)) if prefix.starts_with("iptables") => rest.to_string(),
            _ => line.to_string(),
        })
        .collect()
}
