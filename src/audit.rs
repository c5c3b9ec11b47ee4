//! Audit logging for privileged operations
//!
//! Every rule change, save, load and verification is appended to
//! `audit.log` in the state directory as one JSON object per line.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    AddRule,
    DeleteRule,
    SaveRules,
    LoadRules,
    VerifyRules,
    BackupRules,
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
    /// Opens the audit log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined or created
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        crate::utils::ensure_dirs()?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Uses an explicit file instead of the state directory
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event to the audit log
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

    /// Reads the most recent events, newest first
    ///
    /// Lines that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

async fn record(
    event_type: EventType,
    success: bool,
    details: serde_json::Value,
    error: Option<String>,
) {
    match AuditLog::new() {
        Ok(audit) => {
            let event = AuditEvent::new(event_type, success, details, error);
            if let Err(e) = audit.log(event).await {
                tracing::warn!("Failed to write audit log: {}", e);
            }
        }
        Err(e) => tracing::debug!("Audit log unavailable: {}", e),
    }
}

/// Logs an add or delete of a rule
pub async fn log_rule_change(
    event_type: EventType,
    rule: serde_json::Value,
    log_companion: bool,
    success: bool,
    error: Option<String>,
) {
    record(
        event_type,
        success,
        serde_json::json!({
            "rule": rule,
            "log_companion": log_companion,
        }),
        error,
    )
    .await;
}

/// Logs a save to the persistent rules file
pub async fn log_save(
    family: &str,
    path: &Path,
    checksum: Option<&str>,
    success: bool,
    error: Option<String>,
) {
    record(
        EventType::SaveRules,
        success,
        serde_json::json!({
            "family": family,
            "path": path.display().to_string(),
            "sha256": checksum,
        }),
        error,
    )
    .await;
}

/// Logs a restore from the persistent rules file
pub async fn log_load(
    family: &str,
    path: &Path,
    backup: Option<&Path>,
    success: bool,
    error: Option<String>,
) {
    record(
        EventType::LoadRules,
        success,
        serde_json::json!({
            "family": family,
            "path": path.display().to_string(),
            "backup": backup.map(|b| b.display().to_string()),
        }),
        error,
    )
    .await;
}

/// Logs a dry-run verification
pub async fn log_verify(family: &str, success: bool, error_count: usize, error: Option<String>) {
    record(
        EventType::VerifyRules,
        success,
        serde_json::json!({
            "family": family,
            "error_count": error_count,
        }),
        error,
    )
    .await;
}

/// Logs a pre-load backup of the live ruleset
pub async fn log_backup(family: &str, path: Option<&Path>, success: bool, error: Option<String>) {
    record(
        EventType::BackupRules,
        success,
        serde_json::json!({
            "family": family,
            "path": path.map(|p| p.display().to_string()),
        }),
        error,
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_creation() {
        let event = AuditEvent::new(
            EventType::AddRule,
            true,
            serde_json::json!({"rule": {"chain": "INPUT"}}),
            None,
        );

        assert!(event.success);
        assert!(event.error.is_none());
        assert_eq!(event.details["rule"]["chain"], "INPUT");
    }

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(
            EventType::VerifyRules,
            false,
            serde_json::json!({"error_count": 2}),
            Some("line 3 failed".to_string()),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("verify_rules"));
        assert!(json.contains("line 3 failed"));
        assert_eq!(EventType::VerifyRules.to_string(), "verify_rules");
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"timestamp":"2024-01-01T00:00:00Z","event_type":"delete_rule","success":true,"details":{},"error":null}"#;
        let event: AuditEvent = serde_json::from_str(json).unwrap();

        assert!(event.success);
        assert_eq!(event.event_type, EventType::DeleteRule);
    }

    #[tokio::test]
    async fn test_log_and_read_recent_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::at(dir.path().join("audit.log"));

        for (i, event_type) in [EventType::AddRule, EventType::SaveRules, EventType::LoadRules]
            .into_iter()
            .enumerate()
        {
            audit
                .log(AuditEvent::new(
                    event_type,
                    true,
                    serde_json::json!({ "seq": i }),
                    None,
                ))
                .await
                .unwrap();
        }

        let recent = audit.read_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_type, EventType::LoadRules);
        assert_eq!(recent[1].event_type, EventType::SaveRules);
    }

    #[tokio::test]
    async fn test_read_recent_skips_garbage_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::at(dir.path().join("audit.log"));
        assert!(audit.read_recent(10).await.unwrap().is_empty());

        tokio::fs::write(audit.path(), "not json\n").await.unwrap();
        audit
            .log(AuditEvent::new(
                EventType::BackupRules,
                false,
                serde_json::json!({}),
                Some("boom".to_string()),
            ))
            .await
            .unwrap();

        let recent = audit.read_recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].error.as_deref(), Some("boom"));
    }
}
