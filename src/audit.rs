//! Audit logging for privileged operations
//!
//! Every run that touches the firewall or sends probe traffic leaves one
//! JSON line in `audit.log` under the state directory.

use crate::core::validator::Summary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ApplyRules,
    ResetFirewall,
    ValidateRules,
    GenerateReport,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    /// Creates a new audit event
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates an audit log at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event to the audit log
    ///
    /// Events are written as JSON-lines format (one JSON object per line)
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Appends an event, logging a warning instead of failing
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(event).await {
            tracing::warn!("Failed to write audit log {}: {}", self.log_path.display(), e);
        }
    }
}

impl AuditEvent {
    /// An apply run: `applied` of `rule_count` rules went in
    pub fn apply(rule_count: usize, applied: usize, error: Option<String>) -> Self {
        Self::new(
            EventType::ApplyRules,
            error.is_none(),
            serde_json::json!({
                "rule_count": rule_count,
                "applied": applied,
            }),
            error,
        )
    }

    /// A firewall flush
    pub fn reset(error: Option<String>) -> Self {
        Self::new(
            EventType::ResetFirewall,
            error.is_none(),
            serde_json::json!({}),
            error,
        )
    }

    /// A validation run over `rules_file`
    pub fn validate(rules_file: &Path, summary: Option<Summary>, error: Option<String>) -> Self {
        Self::new(
            EventType::ValidateRules,
            error.is_none(),
            serde_json::json!({
                "rules_file": rules_file.display().to_string(),
                "summary": summary,
            }),
            error,
        )
    }

    /// A report written to `report_file`
    pub fn report(report_file: &Path, result_count: usize, error: Option<String>) -> Self {
        Self::new(
            EventType::GenerateReport,
            error.is_none(),
            serde_json::json!({
                "report_file": report_file.display().to_string(),
                "result_count": result_count,
            }),
            error,
        )
    }
}
