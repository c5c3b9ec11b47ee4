//! Dry-run verification of saved rules files
//!
//! `iptables-restore --test` parses a rules file and reports errors without
//! committing anything, which lets `load` refuse a broken file before the
//! live ruleset is touched.
use crate::config::AppConfig;
use crate::core::error::{Error, Result};
use crate::core::invocation;
use crate::core::iptables;
use crate::core::rule::Family;
use std::path::Path;
use tracing::{info, warn};

/// Result of a rules file verification
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub success: bool,
    pub errors: Vec<String>,
}

impl VerifyResult {
    pub fn success() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// Verifies a rules file with `<family>-restore --test`
///
/// A non-zero exit is a verification failure, not an error.
///
/// # Errors
///
/// Returns `Err` if the tool cannot be spawned or elevated.
pub async fn verify_rules_file(
    family: Family,
    path: &Path,
    counters: bool,
) -> Result<VerifyResult> {
    let inv = invocation::restore(family, path, counters, true);
    info!("Verifying {} via {}", path.display(), inv);

    let result = match iptables::run(&inv).await {
        Ok(_) => {
            info!("Rules file verification passed");
            VerifyResult::success()
        }
        Err(Error::Iptables {
            stderr,
            exit_code: Some(code),
            ..
        }) => {
            let stderr = stderr.unwrap_or_default();
            warn!("Rules file verification failed (exit {code}): {stderr}");
            let mut errors = parse_restore_errors(&stderr);
            if errors.is_empty() {
                errors.push(format!("{} exited with status {code}", inv.tool));
            }
            VerifyResult::failure(errors)
        }
        Err(e) => {
            crate::audit::log_verify(family.as_ref(), false, 0, Some(e.to_string())).await;
            return Err(e);
        }
    };

    crate::audit::log_verify(
        family.as_ref(),
        result.success,
        result.errors.len(),
        result.errors.first().cloned(),
    )
    .await;

    Ok(result)
}

/// Requires the configured rules file for `family` to exist and pass `--test`.
///
/// # Errors
///
/// - `Error::RulesFileNotFound` if the file is missing
/// - `Error::Iptables` carrying the parsed messages if `--test` rejects it
pub async fn ensure_valid(config: &AppConfig, family: Family) -> Result<()> {
    let path = config.rules_path(family);
    if !path.exists() {
        return Err(Error::RulesFileNotFound(path.to_path_buf()));
    }

    let verification = verify_rules_file(family, path, config.save_counters).await?;
    if verification.success {
        Ok(())
    } else {
        Err(Error::Iptables {
            message: format!("{} --test rejected {}", family.restore_tool(), path.display()),
            stderr: Some(verification.errors.join("\n")),
            exit_code: None,
        })
    }
}

/// Parses restore stderr into one message per line
///
/// Tool-name prefixes and the trailing usage hint are dropped.
fn parse_restore_errors(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Try `"))
        .map(|line| {
            line.trim_start_matches("iptables-restore: ")
                .trim_start_matches("ip6tables-restore: ")
                .trim_start_matches("Error: ")
                .to_string()
        })
        .collect()
}
