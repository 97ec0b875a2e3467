//! Mode dispatch
//!
//! A [`Session`] holds the resolved configuration and the state directory
//! and runs one mode per invocation. Console output goes to the writer the
//! caller passes in; the binary passes stdout.
//!
//! State directory contents:
//!
//! - `last_run.json`: the last validation run, reused by [`Mode::Report`]
//!   while the rules file is unchanged
//! - `audit.log`: one JSON line per privileged operation

use crate::audit::{AuditEvent, AuditLog};
use crate::config::AppConfig;
use crate::core::error::Result;
use crate::core::firewall;
use crate::core::results::{self, ValidationRun};
use crate::core::rules::{self, RuleSet};
use crate::core::traffic::Hping3Probe;
use crate::core::validator::{RuleValidator, Summary, ValidationResult};
use crate::elevation::Tool;
use crate::report::ReportGenerator;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// Printed when no mode flag was given
pub const NO_MODE_MESSAGE: &str = "No valid option provided. Use --help to see available options.";

const AUDIT_FILE_NAME: &str = "audit.log";

/// What a single invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Append every rule of the rules file with iptables
    Apply,
    /// Flush all iptables rules
    Reset,
    /// Probe every rule, print the summary, persist the run, write the report
    Validate,
    /// Render the report, reusing the last run when it matches the rules file
    Report,
}

pub struct Session {
    config: AppConfig,
    state_dir: Option<PathBuf>,
    dry_run: bool,
}

impl Session {
    /// Creates a session. Without a state directory nothing is persisted
    /// or audited.
    pub fn new(config: AppConfig, state_dir: Option<PathBuf>) -> Self {
        Self {
            config,
            state_dir,
            dry_run: false,
        }
    }

    /// Print the commands that would run instead of running them
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs `mode`; `None` prints [`NO_MODE_MESSAGE`] and succeeds.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the mode: unreadable rules,
    /// iptables or hping3 failures, an untrustworthy saved run, or a report
    /// that cannot be written.
    pub async fn run<W: Write>(&self, mode: Option<Mode>, out: &mut W) -> Result<()> {
        let Some(mode) = mode else {
            writeln!(out, "{NO_MODE_MESSAGE}")?;
            return Ok(());
        };

        if let Some(dir) = &self.state_dir
            && let Err(e) = crate::utils::ensure_private_dir(dir)
        {
            warn!("Failed to create state directory {}: {e}", dir.display());
        }

        match mode {
            Mode::Reset => self.reset(out).await,
            Mode::Apply => self.apply(out).await,
            Mode::Validate => self.validate(out).await,
            Mode::Report => self.generate_report(out).await,
        }
    }

    async fn reset<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.dry_run {
            writeln!(out, "{}", Tool::Iptables.command_line(&firewall::reset_args()))?;
            return Ok(());
        }

        writeln!(out, "Resetting the firewall...")?;
        let result = firewall::reset_firewall().await;
        self.audit(AuditEvent::reset(error_text(&result))).await;
        result?;

        writeln!(out, "Firewall rules have been reset.")?;
        Ok(())
    }

    async fn apply<W: Write>(&self, out: &mut W) -> Result<()> {
        let rule_set = rules::load_rules(&self.config.rules_file).await?;

        if self.dry_run {
            for rule in &rule_set.rules {
                writeln!(out, "{}", Tool::Iptables.command_line(&firewall::rule_args(rule)))?;
            }
            return Ok(());
        }

        writeln!(out, "Applying firewall rules...")?;
        for rule in &rule_set.rules {
            writeln!(out, "Applying Rule {}: {rule}", rule.rule_id)?;
        }

        let result = firewall::apply_all_rules(&rule_set.rules).await;
        let applied = result.as_ref().map_or(0, |n| *n);
        self.audit(AuditEvent::apply(
            rule_set.rules.len(),
            applied,
            error_text(&result),
        ))
        .await;
        result?;

        writeln!(out, "Firewall rules applied successfully.")?;
        Ok(())
    }

    async fn validate<W: Write>(&self, out: &mut W) -> Result<()> {
        let rule_set = rules::load_rules(&self.config.rules_file).await?;

        if self.dry_run {
            return self.print_probe_commands(&rule_set, out);
        }

        let run = self.validate_and_save(rule_set, out).await?;
        self.write_report(&run).await?;
        writeln!(
            out,
            "\nValidation report generated: {}",
            self.config.report_file.display()
        )?;
        Ok(())
    }

    async fn generate_report<W: Write>(&self, out: &mut W) -> Result<()> {
        let rule_set = rules::load_rules(&self.config.rules_file).await?;

        let saved = match self.results_path() {
            Some(path) => results::load_run(&path).await?,
            None => None,
        };

        let run = match saved {
            Some(run) if run.is_for(&rule_set.source) => {
                info!("Reusing validation run from {}", run.validated_at);
                writeln!(out, "Generating report from the last validation results...")?;
                run
            }
            saved => {
                if let Some(stale) = saved {
                    info!(
                        "Last validation was for {} ({}), validating again",
                        stale.source.path.display(),
                        stale.source.checksum
                    );
                }
                if self.dry_run {
                    return self.print_probe_commands(&rule_set, out);
                }
                writeln!(
                    out,
                    "No saved validation for {}, validating rules...",
                    rule_set.source.path.display()
                )?;
                self.validate_and_save(rule_set, out).await?
            }
        };

        if self.dry_run {
            writeln!(out, "Would write {}", self.config.report_file.display())?;
            return Ok(());
        }

        self.write_report(&run).await?;
        writeln!(out, "Report generated: {}", self.config.report_file.display())?;
        Ok(())
    }

    /// Probes every rule, prints the console summary and persists the run.
    async fn validate_and_save<W: Write>(
        &self,
        rule_set: RuleSet,
        out: &mut W,
    ) -> Result<ValidationRun> {
        writeln!(out, "Validating firewall rules...")?;

        let validator = RuleValidator::new(self.probe());
        let result = validator.validate_rules(&rule_set.rules).await;
        let summary = result.as_ref().ok().map(|r| Summary::from_results(r));
        self.audit(AuditEvent::validate(
            &rule_set.source.path,
            summary,
            error_text(&result),
        ))
        .await;
        let outcomes = result?;

        if let Some(summary) = summary {
            info!(
                total = summary.total,
                passed = summary.passed,
                failed = summary.failed,
                "Validation finished"
            );
        }

        writeln!(out, "\nValidation Summary:")?;
        print_summary(out, &outcomes)?;

        let run = ValidationRun::new(rule_set.source, outcomes);
        if let Some(path) = self.results_path()
            && let Err(e) = results::save_run(&path, &run).await
        {
            warn!("Failed to save validation run: {e}");
        }
        Ok(run)
    }

    async fn write_report(&self, run: &ValidationRun) -> Result<()> {
        let report_file = &self.config.report_file;
        let result = ReportGenerator::new()
            .and_then(|generator| generator.generate_html_report(run, report_file));
        self.audit(AuditEvent::report(
            report_file,
            run.results.len(),
            error_text(&result),
        ))
        .await;
        result
    }

    fn print_probe_commands<W: Write>(&self, rule_set: &RuleSet, out: &mut W) -> Result<()> {
        let probe = self.probe();
        for rule in &rule_set.rules {
            writeln!(out, "{}", Tool::Hping3.command_line(&probe.args_for(rule)))?;
        }
        Ok(())
    }

    fn probe(&self) -> Hping3Probe {
        Hping3Probe::new(self.config.target.clone(), self.config.probe_timeout())
    }

    fn results_path(&self) -> Option<PathBuf> {
        self.state_dir.as_deref().map(results::results_path)
    }

    async fn audit(&self, event: AuditEvent) {
        if let Some(dir) = &self.state_dir {
            AuditLog::at(dir.join(AUDIT_FILE_NAME)).record(event).await;
        }
    }
}

fn error_text<T>(result: &Result<T>) -> Option<String> {
    result.as_ref().err().map(ToString::to_string)
}

/// Writes the per-rule console summary followed by the totals.
fn print_summary<W: Write>(out: &mut W, results: &[ValidationResult]) -> std::io::Result<()> {
    for result in results {
        writeln!(out, "Rule {}: {}", result.rule_id, result.status)?;
        writeln!(out, "  Protocol: {}, Port: {}", result.protocol, result.port)?;
        writeln!(out, "  Direction: {}", result.direction)?;
        writeln!(
            out,
            "  Expected: {}, Observed: {}",
            result.expected_action, result.observed_action
        )?;
    }

    let summary = Summary::from_results(results);
    writeln!(
        out,
        "\n{} passed, {} failed, {} total",
        summary.passed, summary.failed, summary.total
    )
}
