//! Typed rule arguments
//!
//! The command line hands us plain strings. Before anything is handed to
//! iptables they are parsed into the types below, so an invalid chain, port or
//! address is rejected without spawning a process.
//!
//! # Example
//!
//! ```
//! use netsimpler::core::rule::{Family, RuleSpec};
//!
//! let rule = RuleSpec::parse(
//!     Family::Ipv4,
//!     "INPUT",
//!     "tcp",
//!     "22",
//!     "accept",
//!     Some("10.0.0.0/8"),
//!     None,
//! )
//! .unwrap();
//! assert_eq!(rule.target.to_string(), "ACCEPT");
//! assert_eq!(rule.port.to_string(), "22");
//! ```

use crate::core::error::{Error, Result};
use crate::elevation::Tool;
use crate::validators;
use ipnetwork::IpNetwork;
use std::fmt;
use std::str::FromStr;

/// Address family, selecting the iptables or ip6tables tool set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::AsRefStr)]
pub enum Family {
    #[default]
    #[strum(serialize = "ipv4")]
    Ipv4,
    #[strum(serialize = "ipv6")]
    Ipv6,
}

impl Family {
    pub const fn from_ipv6_flag(ipv6: bool) -> Self {
        if ipv6 { Family::Ipv6 } else { Family::Ipv4 }
    }

    /// Rule manipulation tool (`iptables` / `ip6tables`)
    pub const fn rules_tool(self) -> Tool {
        match self {
            Family::Ipv4 => Tool::Iptables,
            Family::Ipv6 => Tool::Ip6tables,
        }
    }

    pub const fn save_tool(self) -> Tool {
        match self {
            Family::Ipv4 => Tool::IptablesSave,
            Family::Ipv6 => Tool::Ip6tablesSave,
        }
    }

    pub const fn restore_tool(self) -> Tool {
        match self {
            Family::Ipv4 => Tool::IptablesRestore,
            Family::Ipv6 => Tool::Ip6tablesRestore,
        }
    }

    /// Suffix used for rules files (`rules.v4` / `rules.v6`)
    pub const fn file_suffix(self) -> &'static str {
        match self {
            Family::Ipv4 => "v4",
            Family::Ipv6 => "v6",
        }
    }
}

/// Transport protocol for a port match
///
/// Only protocols that support `--dport` are accepted, since every rule this
/// tool builds matches a destination port.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "udplite")]
    UdpLite,
    #[strum(serialize = "sctp")]
    Sctp,
    #[strum(serialize = "dccp")]
    Dccp,
}

/// Destination port or inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
}

impl PortSpec {
    /// First port of the spec, used for informational hints
    pub const fn first(self) -> u16 {
        match self {
            PortSpec::Single(p) | PortSpec::Range(p, _) => p,
        }
    }
}

impl FromStr for PortSpec {
    type Err = Error;

    /// Accepts `80`, `8000:9000` (iptables form) or `8000-9000`.
    fn from_str(s: &str) -> Result<Self> {
        let parse_one = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| Error::validation("port", format!("'{p}' is not a port number")))
        };

        let s = s.trim();
        match s.split_once([':', '-']) {
            Some((start, end)) => {
                let (start, end) =
                    validators::validate_port_range(parse_one(start)?, parse_one(end)?)
                        .map_err(|e| Error::validation("port", e))?;
                if start == end {
                    Ok(PortSpec::Single(start))
                } else {
                    Ok(PortSpec::Range(start, end))
                }
            }
            None => validators::validate_port(parse_one(s)?)
                .map(PortSpec::Single)
                .map_err(|e| Error::validation("port", e)),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(p) => write!(f, "{p}"),
            PortSpec::Range(start, end) => write!(f, "{start}:{end}"),
        }
    }
}

/// A validated chain name (built-in or user-defined)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainName(String);

impl ChainName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChainName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validators::validate_chain_name(s)
            .map(ChainName)
            .map_err(|e| Error::validation("chain", e))
    }
}

impl fmt::Display for ChainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Jump target for a matching packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Accept,
    Drop,
    Reject,
    Return,
    Log,
    /// Jump to a user-defined chain
    Chain(ChainName),
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "ACCEPT" => Target::Accept,
            "DROP" => Target::Drop,
            "REJECT" => Target::Reject,
            "RETURN" => Target::Return,
            "LOG" => Target::Log,
            _ => Target::Chain(s.parse().map_err(|e| match e {
                Error::Validation { message, .. } => Error::validation("action", message),
                other => other,
            })?),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Accept => f.write_str("ACCEPT"),
            Target::Drop => f.write_str("DROP"),
            Target::Reject => f.write_str("REJECT"),
            Target::Return => f.write_str("RETURN"),
            Target::Log => f.write_str("LOG"),
            Target::Chain(chain) => fmt::Display::fmt(chain, f),
        }
    }
}

/// One add/delete request: `<chain> <protocol> <port> <action> [--source] [--dest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub family: Family,
    pub chain: ChainName,
    pub protocol: Protocol,
    pub port: PortSpec,
    pub target: Target,
    pub source: Option<IpNetwork>,
    pub destination: Option<IpNetwork>,
}

impl RuleSpec {
    /// Parses and validates raw command-line strings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` naming the first offending field.
    pub fn parse(
        family: Family,
        chain: &str,
        protocol: &str,
        port: &str,
        target: &str,
        source: Option<&str>,
        destination: Option<&str>,
    ) -> Result<Self> {
        let protocol = Protocol::from_str(protocol).map_err(|_| {
            Error::validation(
                "protocol",
                format!(
                    "'{protocol}' does not support port matching \
                     (use tcp, udp, udplite, sctp or dccp)"
                ),
            )
        })?;

        Ok(Self {
            family,
            chain: chain.parse()?,
            protocol,
            port: port.parse()?,
            target: target.parse()?,
            source: source
                .map(|s| parse_address(family, "source", s))
                .transpose()?,
            destination: destination
                .map(|d| parse_address(family, "dest", d))
                .transpose()?,
        })
    }

    /// Structured summary for the audit log
    pub fn audit_details(&self) -> serde_json::Value {
        serde_json::json!({
            "family": self.family.as_ref(),
            "chain": self.chain.as_str(),
            "protocol": self.protocol.as_ref(),
            "port": self.port.to_string(),
            "action": self.target.to_string(),
            "source": self.source.map(|s| s.to_string()),
            "destination": self.destination.map(|d| d.to_string()),
        })
    }
}

fn parse_address(family: Family, field: &str, raw: &str) -> Result<IpNetwork> {
    let net: IpNetwork = raw
        .trim()
        .parse()
        .map_err(|_| Error::validation(field, format!("'{raw}' is not an IP address or network")))?;
    validators::validate_address_family(net, family).map_err(|e| Error::validation(field, e))
}
