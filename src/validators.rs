//! Input validation and sanitization functions for netsimpler
//!
//! Every argument that ends up on a firewall-tool command line passes through
//! here first. Arguments are never interpreted by a shell, but iptables itself
//! treats a leading `-` as an option, so names are restricted to a safe
//! ASCII subset.

use crate::core::rule::Family;
use ipnetwork::IpNetwork;

/// Maximum chain name length accepted by the kernel (`XT_EXTENSION_MAXNAMELEN - 1`)
pub const MAX_CHAIN_NAME_LEN: usize = 28;

/// Maximum `--log-prefix` length accepted by the LOG target
pub const MAX_LOG_PREFIX_LEN: usize = 29;

/// Validates a chain or target name.
///
/// # Errors
///
/// Returns `Err` if:
/// - Name is empty or longer than 28 characters
/// - Name starts with `-` (would be parsed as an option)
/// - Name contains anything other than ASCII alphanumerics, `-`, `_`, `.`
///
/// # Examples
///
/// ```
/// use netsimpler::validators::validate_chain_name;
///
/// assert!(validate_chain_name("INPUT").is_ok());
/// assert!(validate_chain_name("my-chain_2").is_ok());
/// assert!(validate_chain_name("-F").is_err());
/// assert!(validate_chain_name("INPUT; reboot").is_err());
/// ```
pub fn validate_chain_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Chain name cannot be empty".to_string());
    }

    if name.len() > MAX_CHAIN_NAME_LEN {
        return Err(format!(
            "Chain name too long (max {MAX_CHAIN_NAME_LEN} characters)"
        ));
    }

    if name.starts_with('-') {
        return Err("Chain name cannot start with '-'".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("Chain name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates a log prefix for the LOG target.
///
/// Control characters and quotes are stripped; the kernel caps the prefix at
/// 29 bytes.
///
/// # Errors
///
/// Returns `Err` if:
/// - Prefix is empty
/// - Prefix exceeds 29 characters
/// - All characters are invalid (becomes empty after sanitization)
pub fn validate_log_prefix(prefix: &str) -> Result<String, String> {
    if prefix.is_empty() {
        return Err("Log prefix cannot be empty".to_string());
    }

    if prefix.len() > MAX_LOG_PREFIX_LEN {
        return Err(format!(
            "Log prefix too long (max {MAX_LOG_PREFIX_LEN} chars)"
        ));
    }

    let sanitized: String = prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | ':' | '.'))
        .collect();

    if sanitized.trim().is_empty() {
        return Err("Log prefix contains only invalid characters".to_string());
    }

    Ok(sanitized)
}

/// Checks that an address belongs to the tool family it will be passed to.
///
/// `iptables` rejects IPv6 networks and `ip6tables` rejects IPv4 ones, but only
/// after elevation; catching it here saves a password prompt.
///
/// # Errors
///
/// Returns `Err` on a family mismatch.
pub fn validate_address_family(net: IpNetwork, family: Family) -> Result<IpNetwork, String> {
    match (net, family) {
        (IpNetwork::V4(_), Family::Ipv4) | (IpNetwork::V6(_), Family::Ipv6) => Ok(net),
        (IpNetwork::V6(_), Family::Ipv4) => {
            Err(format!("{net} is an IPv6 address; add --ipv6 to use ip6tables"))
        }
        (IpNetwork::V4(_), Family::Ipv6) => {
            Err(format!("{net} is an IPv4 address but --ipv6 was given"))
        }
    }
}

/// Checks if a port is well-known and returns informational message.
///
/// This is informational only and does not block the rule.
pub fn check_well_known_port(port: u16) -> Option<String> {
    if port <= 1024 {
        let name = match port {
            22 => "SSH",
            80 => "HTTP",
            443 => "HTTPS",
            53 => "DNS",
            25 => "SMTP",
            21 => "FTP",
            _ => return Some(format!("Privileged port {port}")),
        };
        Some(format!("Port {port}: {name}"))
    } else {
        None
    }
}

/// Checks if an IP is in a reserved range and returns informational warning.
///
/// This is informational only and does not block the rule.
pub fn check_reserved_ip(ip: IpNetwork) -> Option<String> {
    use std::net::IpAddr;

    match ip.ip() {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();

            // RFC 1918 private ranges
            if octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
            {
                return Some("Private IP range (RFC 1918) - usually safe for LAN".to_string());
            }

            if octets[0] == 127 {
                return Some("Loopback range (127.x) - only matches local traffic".to_string());
            }

            if octets[0] == 169 && octets[1] == 254 {
                return Some("Link-local range (169.254.x.x) - APIPA addresses".to_string());
            }

            None
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() {
                return Some("IPv6 loopback (::1) - only matches local traffic".to_string());
            }

            if ipv6.segments()[0] & 0xffc0 == 0xfe80 {
                return Some("IPv6 link-local (fe80::/10) - local network only".to_string());
            }

            None
        }
    }
}
