use std::path::PathBuf;
use thiserror::Error;

/// Core error types for netsimpler
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Firewall tool exited non-zero
    #[error("iptables error: {message}")]
    Iptables {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Privilege escalation failed
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// Saved rules file does not exist
    #[error("Rules file not found: {}", .0.display())]
    RulesFileNotFound(PathBuf),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Text captured from the failing tool, falling back to the error itself.
    ///
    /// This is what the CLI prints after `Error executing command:`.
    pub fn captured_text(&self) -> String {
        match self {
            Error::Iptables {
                stderr: Some(stderr),
                ..
            } if !stderr.trim().is_empty() => stderr.trim_end().to_string(),
            Error::Iptables { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Known iptables stderr patterns and what they usually mean
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches tool output against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("permission denied")
            || lower.contains("operation not permitted")
            || lower.contains("you must be root")
        {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run from a terminal so sudo can prompt for a password")
                .with_suggestion("Or force a method: NETSIMPLER_ELEVATION_METHOD=sudo")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables-nft  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S iptables  (Arch)")
                .with_help("https://wiki.archlinux.org/title/Iptables");
        }

        // Lock held by another xtables process
        if lower.contains("xtables lock") || lower.contains("another app is currently holding") {
            return ErrorTranslation::new("Another program is modifying the firewall")
                .with_suggestion("Wait a moment and try again")
                .with_suggestion(
                    "Check for conflicting firewall managers: sudo systemctl status firewalld ufw",
                );
        }

        // `-D` on a rule that is not there
        if lower.contains("bad rule") || lower.contains("does a matching rule exist") {
            return ErrorTranslation::new("No matching rule exists in that chain")
                .with_suggestion("Delete takes the same arguments the rule was added with")
                .with_suggestion("List current rules with: netsimpler list");
        }

        if lower.contains("no chain/target/match by that name")
            || (lower.contains("chain") && lower.contains("does not exist"))
        {
            return ErrorTranslation::new("Chain or target not found")
                .with_suggestion("Built-in chains are INPUT, OUTPUT and FORWARD (upper-case)")
                .with_suggestion("User chains must be created first: iptables -N <name>")
                .with_help("https://www.netfilter.org/documentation/HOWTO/packet-filtering-HOWTO-7.html");
        }

        if lower.contains("unknown option") && lower.contains("--dport") {
            return ErrorTranslation::new("Port matching is not supported for this protocol")
                .with_suggestion("Use tcp, udp, udplite, sctp or dccp when matching ports");
        }

        if lower.contains("host/network") && lower.contains("not found") {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper IP format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("For IPv6 use --ipv6 with 2001:db8::1 or 2001:db8::/32");
        }

        if lower.contains("restore") && lower.contains("line") && lower.contains("failed") {
            return ErrorTranslation::new("Saved rules file could not be restored")
                .with_suggestion("Check the reported line in the rules file")
                .with_suggestion("Dry-run the file first with: netsimpler verify")
                .with_suggestion("Re-create it from the live ruleset with: netsimpler save");
        }

        if lower.contains("can't initialize") || lower.contains("table does not exist") {
            return ErrorTranslation::new("Kernel firewall table is unavailable")
                .with_suggestion("Check kernel modules: lsmod | grep -E 'ip_tables|nf_tables'")
                .with_suggestion("Load the filter module: sudo modprobe iptable_filter");
        }

        ErrorTranslation::new("The firewall tool reported an error")
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -L -n")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary() {
        let translation = IptablesErrorPattern::match_error("sudo: iptables: command not found");
        assert!(translation.user_message.contains("not installed"));
        assert!(translation.suggestions.len() >= 3);
        assert!(translation.help_url.is_some());
    }

    #[test]
    fn test_permission_denied() {
        let translation = IptablesErrorPattern::match_error(
            "iptables v1.8.9 (nf_tables): Could not fetch rule set generation id: Permission denied (you must be root)",
        );
        assert!(translation.user_message.contains("permissions"));
        assert!(
            translation
                .suggestions
                .iter()
                .any(|s| s.contains("NETSIMPLER_ELEVATION_METHOD"))
        );
    }

    #[test]
    fn test_bad_rule_on_delete() {
        let translation = IptablesErrorPattern::match_error(
            "iptables: Bad rule (does a matching rule exist in that chain?).",
        );
        assert!(translation.user_message.contains("No matching rule"));
    }

    #[test]
    fn test_unknown_chain() {
        let translation =
            IptablesErrorPattern::match_error("iptables: No chain/target/match by that name.");
        assert!(translation.user_message.contains("Chain or target"));
        assert!(translation.suggestions.iter().any(|s| s.contains("-N")));
    }

    #[test]
    fn test_lock_held() {
        let translation = IptablesErrorPattern::match_error(
            "Another app is currently holding the xtables lock. Perhaps you want to use the -w option?",
        );
        assert!(translation.user_message.contains("Another program"));
    }

    #[test]
    fn test_restore_line_failure() {
        let translation =
            IptablesErrorPattern::match_error("iptables-restore: line 7 failed");
        assert!(translation.user_message.contains("restored"));
        assert!(translation.suggestions.iter().any(|s| s.contains("verify")));
    }

    #[test]
    fn test_generic_fallback() {
        let translation = IptablesErrorPattern::match_error("something odd happened");
        assert!(translation.user_message.contains("firewall tool"));
        assert!(translation.suggestions.iter().any(|s| s.contains("iptables -L")));
    }

    #[test]
    fn test_captured_text_prefers_stderr() {
        let err = Error::Iptables {
            message: "exit status 1".to_string(),
            stderr: Some("iptables: Bad rule.\n".to_string()),
            exit_code: Some(1),
        };
        assert_eq!(err.captured_text(), "iptables: Bad rule.");

        let err = Error::Iptables {
            message: "exit status 4".to_string(),
            stderr: Some("  \n".to_string()),
            exit_code: Some(4),
        };
        assert_eq!(err.captured_text(), "exit status 4");
    }

    #[test]
    fn test_validation_display() {
        let err = Error::validation("port", "Port must be between 1 and 65535");
        assert_eq!(
            err.to_string(),
            "Validation error in port: Port must be between 1 and 65535"
        );
    }
}
