//! Running firewall-tool invocations
//!
//! Every operation here builds its command line with
//! [`crate::core::invocation`] and runs it through [`run`], which elevates the
//! tool, waits for it, and returns captured stdout. A non-zero exit becomes
//! [`Error::Iptables`] carrying the tool's stderr.

use crate::audit::{self, EventType};
use crate::config::AppConfig;
use crate::core::error::{Error, Result};
use crate::core::invocation::{self, Invocation, RuleOp};
use crate::core::rule::{ChainName, Family, RuleSpec};
use crate::validators;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Runs one invocation to completion and returns its stdout.
///
/// # Errors
///
/// - `Error::Elevation` if no elevation method is usable
/// - `Error::Iptables` with `exit_code: None` if the tool could not be spawned
/// - `Error::Iptables` with the exit code and stderr on non-zero exit
pub async fn run(inv: &Invocation) -> Result<String> {
    debug!("Running: {inv}");

    let output = crate::elevation::create_elevated_command(inv.tool, &inv.arg_refs())?
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            error!("Failed to spawn {}: {e}", inv.tool);
            Error::Iptables {
                message: format!("failed to run {}", inv.tool),
                stderr: Some(format!("{}: {e}", inv.tool)),
                exit_code: None,
            }
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        error!("{} failed: {}", inv.tool, stderr.trim_end());
        Err(Error::Iptables {
            message: match output.status.code() {
                Some(code) => format!("{} exited with status {code}", inv.tool),
                None => format!("{} was terminated by a signal", inv.tool),
            },
            stderr: Some(stderr),
            exit_code: output.status.code(),
        })
    }
}

/// Lists rules with counters (`-L [chain] -v -n`).
pub async fn list_rules(family: Family, chain: Option<&ChainName>) -> Result<String> {
    run(&invocation::list(family, chain)).await
}

/// Validates the configured LOG prefix when logging is requested.
fn log_prefix(config: &AppConfig, log: bool) -> Result<Option<String>> {
    if !log {
        return Ok(None);
    }
    validators::validate_log_prefix(&config.log_prefix)
        .map(Some)
        .map_err(|e| Error::validation("log_prefix", e))
}

/// Appends a rule, preceded by its LOG companion when `log` is set.
///
/// If the action rule fails after the companion went in, the companion is
/// removed again so the chain is left as it was.
pub async fn add_rule(config: &AppConfig, rule: &RuleSpec, log: bool) -> Result<String> {
    let prefix = log_prefix(config, log)?;
    let invocations = invocation::rule_change(RuleOp::Append, rule, prefix.as_deref());

    let mut output = String::new();
    let mut result = Ok(());
    for (i, inv) in invocations.iter().enumerate() {
        match run(inv).await {
            Ok(stdout) => output.push_str(&stdout),
            Err(e) => {
                if i > 0
                    && let Some(prefix) = prefix.as_deref()
                {
                    let undo = invocation::log_companion(RuleOp::Delete, rule, prefix);
                    if let Err(undo_err) = run(&undo).await {
                        warn!("Failed to remove LOG companion after error: {undo_err}");
                    }
                }
                result = Err(e);
                break;
            }
        }
    }

    audit::log_rule_change(
        EventType::AddRule,
        rule.audit_details(),
        log,
        result.is_ok(),
        result.as_ref().err().map(Error::captured_text),
    )
    .await;

    result.map(|()| {
        info!("Added rule to {}", rule.chain);
        output
    })
}

/// Deletes a rule, followed by its LOG companion when `log` is set.
pub async fn delete_rule(config: &AppConfig, rule: &RuleSpec, log: bool) -> Result<String> {
    let prefix = log_prefix(config, log)?;
    let invocations = invocation::rule_change(RuleOp::Delete, rule, prefix.as_deref());

    let mut output = String::new();
    let mut result = Ok(());
    for inv in &invocations {
        match run(inv).await {
            Ok(stdout) => output.push_str(&stdout),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    audit::log_rule_change(
        EventType::DeleteRule,
        rule.audit_details(),
        log,
        result.is_ok(),
        result.as_ref().err().map(Error::captured_text),
    )
    .await;

    result.map(|()| {
        info!("Deleted rule from {}", rule.chain);
        output
    })
}

/// Outcome of a successful save
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub bytes: usize,
    pub checksum: String,
}

/// Computes the SHA-256 checksum of saved rules text.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Captures the live ruleset with `<family>-save`.
///
/// Empty output is a valid capture: no tables are loaded yet, as at boot.
async fn capture_live_rules(family: Family, counters: bool) -> Result<String> {
    let content = run(&invocation::save(family, counters)).await?;
    if content.trim().is_empty() {
        warn!("{} printed no rules; no tables are loaded", family.save_tool());
    }
    Ok(content)
}

/// Saves the live ruleset to the configured rules file.
///
/// The output of `-save` is staged in a private temporary file and moved into
/// place with an elevated `install -D -m 644`, so the destination directory
/// may be root-owned.
pub async fn save_rules(config: &AppConfig, family: Family) -> Result<SaveOutcome> {
    let destination = config.rules_path(family).to_path_buf();

    let result: Result<SaveOutcome> = async {
        let content = capture_live_rules(family, config.save_counters).await?;

        let mut staged = tempfile::Builder::new()
            .prefix("netsimpler-")
            .suffix(".rules")
            .tempfile()?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;

        run(&invocation::install_file(staged.path(), &destination)).await?;

        Ok(SaveOutcome {
            path: destination.clone(),
            bytes: content.len(),
            checksum: compute_checksum(&content),
        })
    }
    .await;

    match &result {
        Ok(outcome) => {
            info!("Saved {} bytes of rules to {}", outcome.bytes, outcome.path.display());
            audit::log_save(
                family.as_ref(),
                &destination,
                Some(&outcome.checksum),
                true,
                None,
            )
            .await;
        }
        Err(e) => {
            audit::log_save(family.as_ref(), &destination, None, false, Some(e.captured_text()))
                .await;
        }
    }

    result
}

/// Outcome of a successful load
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
    pub output: String,
}

/// Restores the configured rules file into the kernel.
///
/// Order: the file must exist, pass `--test`, and (when enabled) the live
/// rules are backed up before `-restore` replaces them. Any failure before the
/// restore leaves the live ruleset untouched.
pub async fn load_rules(config: &AppConfig, family: Family, backup: bool) -> Result<LoadOutcome> {
    let path = config.rules_path(family).to_path_buf();

    let result: Result<LoadOutcome> = async {
        crate::core::verify::ensure_valid(config, family).await?;

        let backup_path = if backup && config.backup_before_load {
            Some(backup_live_rules(config, family).await?)
        } else {
            None
        };

        let output = run(&invocation::restore(family, &path, config.save_counters, false)).await?;

        Ok(LoadOutcome {
            path: path.clone(),
            backup: backup_path,
            output,
        })
    }
    .await;

    match &result {
        Ok(outcome) => {
            info!("Loaded rules from {}", outcome.path.display());
            audit::log_load(family.as_ref(), &path, outcome.backup.as_deref(), true, None).await;
        }
        Err(e) => {
            audit::log_load(family.as_ref(), &path, None, false, Some(e.captured_text())).await;
        }
    }

    result
}

fn backup_prefix(family: Family) -> String {
    format!("backup_{}_", family.file_suffix())
}

/// Writes the live ruleset to a timestamped file in the backup directory.
///
/// A failed backup aborts the load; the rules it would have preserved are
/// about to be replaced.
pub async fn backup_live_rules(config: &AppConfig, family: Family) -> Result<PathBuf> {
    let result: Result<PathBuf> = async {
        let dir = config
            .backup_dir()
            .ok_or_else(|| Error::Internal("Failed to get backup directory".to_string()))?;
        create_private_dir(&dir)?;

        let content = capture_live_rules(family, config.save_counters).await?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("{}{timestamp}.rules", backup_prefix(family)));
        write_private_file(&path, &content)?;

        cleanup_old_backups(&dir, family, config.max_backups)?;
        Ok(path)
    }
    .await;

    match &result {
        Ok(path) => {
            info!("Backup saved to {}", path.display());
            audit::log_backup(family.as_ref(), Some(path), true, None).await;
        }
        Err(e) => {
            audit::log_backup(family.as_ref(), None, false, Some(e.to_string())).await;
        }
    }

    result
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)?;
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)?;
    }

    Ok(())
}

fn write_private_file(path: &Path, content: &str) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, content)?;
    }

    Ok(())
}

/// Lists backups for a family, newest first.
///
/// File names embed a sortable timestamp, so name order is age order.
pub fn list_backups(dir: &Path, family: Family) -> Result<Vec<PathBuf>> {
    let prefix = backup_prefix(family);

    let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".rules"))
        })
        .collect();

    backups.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(backups)
}

/// Removes all but the newest `keep` backups for a family.
fn cleanup_old_backups(dir: &Path, family: Family, keep: usize) -> Result<()> {
    let mut backups = list_backups(dir, family)?;

    if backups.len() > keep {
        for old in backups.drain(keep..) {
            if let Err(e) = std::fs::remove_file(&old) {
                warn!("Failed to remove old backup {}: {}", old.display(), e);
            } else {
                debug!("Removed old backup: {}", old.display());
            }
        }
    }

    Ok(())
}
