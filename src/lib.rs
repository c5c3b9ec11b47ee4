//! netsimpler - a small front end for iptables/ip6tables
//!
//! Lists, adds, deletes, saves and restores packet-filtering rules by
//! translating command-line arguments into iptables invocations. Firewall
//! semantics are left entirely to the kernel and the iptables tools.
//!
//! # Architecture
//!
//! - [`core`] - Rule arguments, invocation mapping, execution, verification
//! - [`elevation`] - Privilege escalation for the approved binaries
//! - [`audit`] - Audit logging for all privileged operations
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - XDG directories
//!
//! # Safety Features
//!
//! - Every argument is validated before a process is spawned
//! - No shell is ever involved; commands are argv vectors
//! - Rules files pass `iptables-restore --test` before they are loaded
//! - Live rules are backed up before a load replaces them

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::rule::{Family, RuleSpec};
