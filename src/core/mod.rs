//! Core firewall management functionality
//!
//! - [`rule`]: Typed rule arguments (family, chain, protocol, port, target)
//! - [`invocation`]: Pure mapping from rule arguments to firewall-tool argv
//! - [`iptables`]: Running invocations, persistence and pre-load backups
//! - [`verify`]: Dry-run verification of saved rules files
//! - [`error`]: Error types and stderr translation

pub mod error;
pub mod invocation;
pub mod iptables;
pub mod rule;
pub mod verify;

#[cfg(test)]
pub mod test_helpers;
