//! Privilege elevation for firewall operations
//!
//! netsimpler runs as an unprivileged user and only elevates the specific
//! binaries listed in [`Tool`]:
//!
//! - **iptables / ip6tables**: listing, appending and deleting rules
//! - **\*-save / \*-restore**: persistence and dry-run verification
//! - **install**: writing saved rules to `/etc/iptables`
//!
//! # Elevation Strategy
//!
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **No terminal**: `pkexec` for graphical authentication
//!
//! # Environment Variables
//!
//! - `NETSIMPLER_ELEVATION_METHOD`: Force a specific elevation method
//!   (`sudo`, `run0`, or `pkexec`).
//!   Useful for scripts with sudoers NOPASSWD rules.
//!   Example: `NETSIMPLER_ELEVATION_METHOD=sudo netsimpler save`
//!
//! - `NETSIMPLER_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! - `NETSIMPLER_IPTABLES_COMMAND`: Run this program instead of the iptables family,
//!   passing the tool name as its first argument (for test mocks).
//!
//! # Security
//!
//! - Only [`Tool`] variants can be elevated
//! - Commands are built as argv vectors, never through a shell
//! - Callers validate every argument before it gets here
//!
//! # Example
//!
//! ```no_run
//! use netsimpler::elevation::{create_elevated_command, Tool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cmd = create_elevated_command(Tool::Iptables, &["-L", "-v", "-n"])?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use tokio::process::Command;

pub const ELEVATION_METHOD_ENV: &str = "NETSIMPLER_ELEVATION_METHOD";
pub const NO_ELEVATION_ENV: &str = "NETSIMPLER_TEST_NO_ELEVATION";
pub const IPTABLES_COMMAND_ENV: &str = "NETSIMPLER_IPTABLES_COMMAND";

/// Binaries that may be run with elevated privileges
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr, strum::IntoStaticStr,
)]
pub enum Tool {
    #[strum(serialize = "iptables")]
    Iptables,
    #[strum(serialize = "ip6tables")]
    Ip6tables,
    #[strum(serialize = "iptables-save")]
    IptablesSave,
    #[strum(serialize = "ip6tables-save")]
    Ip6tablesSave,
    #[strum(serialize = "iptables-restore")]
    IptablesRestore,
    #[strum(serialize = "ip6tables-restore")]
    Ip6tablesRestore,
    #[strum(serialize = "install")]
    Install,
}

impl Tool {
    /// Whether this tool belongs to the iptables family (and can be mocked)
    pub const fn is_iptables_family(self) -> bool {
        !matches!(self, Tool::Install)
    }
}

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit or run from a terminal")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `NETSIMPLER_ELEVATION_METHOD`
    #[error("Invalid NETSIMPLER_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

/// Resolves the program and leading arguments for a tool, honouring the mock override.
fn resolve_program(tool: Tool) -> (String, Option<&'static str>) {
    if tool.is_iptables_family()
        && let Ok(replacement) = std::env::var(IPTABLES_COMMAND_ENV)
        && !replacement.is_empty()
    {
        return (replacement, Some(tool.into()));
    }
    (tool.to_string(), None)
}

fn direct_command(program: &str, lead: Option<&str>, args: &[&str]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(lead).args(args);
    cmd
}

fn wrapped_command(wrapper: &str, program: &str, lead: Option<&str>, args: &[&str]) -> Command {
    let mut cmd = Command::new(wrapper);
    cmd.arg(program).args(lead).args(args);
    cmd
}

/// Creates a command that runs `tool` with root privileges.
///
/// # Elevation Order
///
/// 1. `NETSIMPLER_TEST_NO_ELEVATION` set: run directly
/// 2. Already root: run directly
/// 3. `NETSIMPLER_ELEVATION_METHOD` set: use that wrapper
/// 4. `run0` if present, else `sudo` on a terminal, else `pkexec`
///
/// # Errors
///
/// Returns `Err(ElevationError)` if the requested or required wrapper is missing,
/// or the method override is not recognised.
pub fn create_elevated_command(tool: Tool, args: &[&str]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    let (program, lead) = resolve_program(tool);

    if std::env::var(NO_ELEVATION_ENV).is_ok() {
        return Ok(direct_command(&program, lead, args));
    }

    if nix::unistd::getuid().is_root() {
        return Ok(direct_command(&program, lead, args));
    }

    if let Ok(method) = std::env::var(ELEVATION_METHOD_ENV) {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if !binary_exists(&method) {
                        return Err(ElevationError::MethodNotAvailable(method));
                    }
                    Ok(wrapped_command(&method, &program, lead, args))
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    if binary_exists("run0") {
        return Ok(wrapped_command("run0", &program, lead, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);
    if is_atty {
        Ok(wrapped_command("sudo", &program, lead, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped_command("pkexec", &program, lead, args))
    }
}

/// Returns `true` when commands will run without a privilege prompt.
pub fn runs_without_prompt() -> bool {
    std::env::var(NO_ELEVATION_ENV).is_ok() || nix::unistd::getuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::ENV_VAR_MUTEX;

    fn argv(cmd: &Command) -> Vec<String> {
        let std_cmd = cmd.as_std();
        std::iter::once(std_cmd.get_program())
            .chain(std_cmd.get_args())
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_binary_exists() {
        assert!(binary_exists("sh"));
        assert!(!binary_exists("netsimpler_nonexistent_binary_xyz"));
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(Tool::Iptables.to_string(), "iptables");
        assert_eq!(Tool::IptablesRestore.as_ref(), "iptables-restore");
        assert!(!Tool::Install.is_iptables_family());
        assert!(Tool::Ip6tablesSave.is_iptables_family());
    }

    #[test]
    fn test_no_elevation_runs_tool_directly() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::set_var(NO_ELEVATION_ENV, "1");
            std::env::remove_var(IPTABLES_COMMAND_ENV);
        }

        let cmd = create_elevated_command(Tool::Iptables, &["-L", "-v", "-n"]).unwrap();
        assert_eq!(argv(&cmd), ["iptables", "-L", "-v", "-n"]);
    }

    #[test]
    fn test_mock_override_passes_tool_name() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::set_var(NO_ELEVATION_ENV, "1");
            std::env::set_var(IPTABLES_COMMAND_ENV, "/tmp/mock.sh");
        }

        let cmd = create_elevated_command(Tool::Ip6tablesSave, &["-c"]).unwrap();
        let install = create_elevated_command(Tool::Install, &["-m", "644"]).unwrap();

        unsafe {
            std::env::remove_var(IPTABLES_COMMAND_ENV);
        }

        assert_eq!(argv(&cmd), ["/tmp/mock.sh", "ip6tables-save", "-c"]);
        // install is never mocked
        assert_eq!(argv(&install), ["install", "-m", "644"]);
    }

    #[test]
    fn test_invalid_elevation_method() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        if nix::unistd::getuid().is_root() {
            // Root short-circuits before the method is inspected
            return;
        }

        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
            std::env::set_var(ELEVATION_METHOD_ENV, "invalid_method");
        }

        let result = create_elevated_command(Tool::Iptables, &["-L"]);

        unsafe {
            std::env::set_var(NO_ELEVATION_ENV, "1");
            std::env::remove_var(ELEVATION_METHOD_ENV);
        }

        assert!(matches!(result, Err(ElevationError::InvalidMethod(_))));
    }

    #[test]
    fn test_elevation_method_case_insensitive() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();

        unsafe {
            std::env::remove_var(NO_ELEVATION_ENV);
            std::env::set_var(ELEVATION_METHOD_ENV, "SUDO");
        }

        let result = create_elevated_command(Tool::Iptables, &["-L"]);

        unsafe {
            std::env::set_var(NO_ELEVATION_ENV, "1");
            std::env::remove_var(ELEVATION_METHOD_ENV);
        }

        // Either sudo exists (Ok) or it doesn't (MethodNotAvailable), never InvalidMethod
        assert!(!matches!(result, Err(ElevationError::InvalidMethod(_))));
    }

    #[test]
    fn test_resolve_program_static_tool_name() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::set_var(IPTABLES_COMMAND_ENV, "/tmp/mock.sh");
        }
        let mocked = resolve_program(Tool::IptablesRestore);
        unsafe {
            std::env::remove_var(IPTABLES_COMMAND_ENV);
        }

        assert_eq!(mocked, ("/tmp/mock.sh".to_string(), Some("iptables-restore")));
        assert_eq!(resolve_program(Tool::Install), ("install".to_string(), None));
    }

    #[test]
    fn test_wrapped_command_shape() {
        let cmd = wrapped_command("sudo", "iptables", None, &["-A", "INPUT"]);
        assert_eq!(argv(&cmd), ["sudo", "iptables", "-A", "INPUT"]);

        let cmd = wrapped_command("run0", "/mock", Some("iptables"), &["-L"]);
        assert_eq!(argv(&cmd), ["run0", "/mock", "iptables", "-L"]);
    }
}
