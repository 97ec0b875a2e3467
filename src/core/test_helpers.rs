//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::rules::{Action, Direction, Protocol, Rule};
use crate::core::traffic::{Observation, TrafficProbe};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("FWPROBE_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("FWPROBE_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Builds a rule without spelling out every field.
pub fn rule(
    rule_id: u32,
    direction: Direction,
    protocol: Protocol,
    port: u16,
    action: Action,
) -> Rule {
    Rule {
        rule_id,
        direction,
        protocol,
        port,
        action,
    }
}

/// The two rules used across the validator tests: inbound SSH allowed,
/// outbound DNS blocked.
pub fn sample_rules() -> Vec<Rule> {
    vec![
        rule(1, Direction::Inbound, Protocol::Tcp, 22, Action::Allow),
        rule(2, Direction::Outbound, Protocol::Udp, 53, Action::Block),
    ]
}

/// Probe that replays a fixed sequence of observations and records which
/// rules it was asked about.
pub struct ScriptedProbe {
    outcomes: Mutex<VecDeque<Observation>>,
    pub probed: Mutex<Vec<u32>>,
}

impl ScriptedProbe {
    pub fn new(outcomes: impl IntoIterator<Item = Observation>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            probed: Mutex::new(Vec::new()),
        }
    }
}

impl TrafficProbe for ScriptedProbe {
    async fn probe(&self, rule: &Rule) -> Result<Observation> {
        self.probed.lock().unwrap().push(rule.rule_id);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Probe {
                rule_id: rule.rule_id,
                message: "no scripted outcome left".to_string(),
            })
    }
}
