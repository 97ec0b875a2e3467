//! Comparison of declared rules against observed traffic
//!
//! Rules are probed one at a time, in file order. Each observation is
//! normalized to the declared-action vocabulary and compared by equality.

use crate::core::error::Result;
use crate::core::rules::{Action, Direction, Protocol, Rule};
use crate::core::traffic::{Observation, TrafficProbe};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of comparing one rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[strum(serialize = "pass")]
    Pass,
    #[strum(serialize = "fail")]
    Fail,
}

/// Result of validating a single rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    pub rule_id: u32,
    pub protocol: Protocol,
    pub port: u16,
    pub direction: Direction,
    pub expected_action: Action,
    pub observed_action: Action,
    pub status: Status,
}

impl ValidationResult {
    /// Compares a rule's declared action with what was observed
    pub fn compare(rule: &Rule, observation: Observation) -> Self {
        let observed_action = observation.normalized();
        let status = if rule.action == observed_action {
            Status::Pass
        } else {
            Status::Fail
        };

        Self {
            rule_id: rule.rule_id,
            protocol: rule.protocol,
            port: rule.port,
            direction: rule.direction,
            expected_action: rule.action,
            observed_action,
            status,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }
}

/// Pass/fail counts over a set of results
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Validates rules by probing each one
pub struct RuleValidator<P> {
    probe: P,
}

impl<P: TrafficProbe> RuleValidator<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Probes every rule in order and compares the outcome to its declared action.
    ///
    /// # Errors
    ///
    /// Returns the first probe error; no partial results are returned.
    pub async fn validate_rules(&self, rules: &[Rule]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            let observation = self.probe.probe(rule).await?;
            let result = ValidationResult::compare(rule, observation);
            info!("Rule {} validation: {}", rule.rule_id, result.status);
            results.push(result);
        }

        Ok(results)
    }
}
