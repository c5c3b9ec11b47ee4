use crate::core::rule::Family;
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// User configuration, read from `config.json` in the XDG config directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where `save`/`load` keep IPv4 rules
    #[serde(default = "default_rules_v4_path")]
    pub rules_v4_path: PathBuf,
    /// Where `save --ipv6`/`load --ipv6` keep IPv6 rules
    #[serde(default = "default_rules_v6_path")]
    pub rules_v6_path: PathBuf,
    /// Prefix for LOG companion rules (max 29 chars, kernel limit)
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Save and restore packet/byte counters (`-c`)
    #[serde(default = "default_true")]
    pub save_counters: bool,
    /// Snapshot live rules into the state directory before `load`
    #[serde(default = "default_true")]
    pub backup_before_load: bool,
    /// Number of pre-load backups to keep per family
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Backup directory; the XDG state directory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules_v4_path: default_rules_v4_path(),
            rules_v6_path: default_rules_v6_path(),
            log_prefix: default_log_prefix(),
            save_counters: true,
            backup_before_load: true,
            max_backups: default_max_backups(),
            backup_dir: None,
        }
    }
}

impl AppConfig {
    pub fn rules_path(&self, family: Family) -> &Path {
        match family {
            Family::Ipv4 => &self.rules_v4_path,
            Family::Ipv6 => &self.rules_v6_path,
        }
    }

    pub fn backup_dir(&self) -> Option<PathBuf> {
        self.backup_dir
            .clone()
            .or_else(crate::utils::get_state_dir)
    }
}

fn default_rules_v4_path() -> PathBuf {
    PathBuf::from("/etc/iptables/rules.v4")
}

fn default_rules_v6_path() -> PathBuf {
    PathBuf::from("/etc/iptables/rules.v6")
}

fn default_log_prefix() -> String {
    "Netfilter: ".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_backups() -> usize {
    5
}

pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Saves the config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file created with mode 0o600.
/// 2. Atomically renames to the target path.
pub async fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600) // Set permissions BEFORE any data is written
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Saves the config to the XDG config directory.
pub async fn save_config(config: &AppConfig) -> std::io::Result<Option<PathBuf>> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    crate::utils::ensure_dirs()?;
    save_config_to(config, &path).await?;
    Ok(Some(path))
}

/// Loads the config from `path`, or returns default if missing or invalid.
pub async fn load_config_from(path: &Path) -> AppConfig {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config {}: {e}", path.display());
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// Loads the config from the XDG config directory, or returns default.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}
