//! Mapping from rule arguments to firewall-tool command lines
//!
//! Nothing here spawns a process. Each function returns the [`Invocation`]
//! that [`crate::core::iptables`] will run, which keeps the flag mapping
//! testable without root.
//!
//! | Operation | Command line                                                      |
//! |-----------|-------------------------------------------------------------------|
//! | list      | `iptables -L [chain] -v -n`                                       |
//! | append    | `iptables -A <chain> -p <proto> --dport <port> [-s] [-d] -j <target>` |
//! | delete    | same as append with `-D`                                          |
//! | save      | `iptables-save [-c]`                                              |
//! | restore   | `iptables-restore [-c] [--test] <file>`                           |

use crate::core::rule::{ChainName, Family, RuleSpec};
use crate::elevation::Tool;
use std::fmt;
use std::path::Path;

/// Whether a rule is being appended or deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    Append,
    Delete,
}

impl RuleOp {
    pub const fn flag(self) -> &'static str {
        match self {
            RuleOp::Append => "-A",
            RuleOp::Delete => "-D",
        }
    }
}

/// A single firewall-tool run: which binary, with which arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// `-L [chain] -v -n`
pub fn list(family: Family, chain: Option<&ChainName>) -> Invocation {
    let mut inv = Invocation::new(family.rules_tool()).arg("-L");
    if let Some(chain) = chain {
        inv = inv.arg(chain.as_str());
    }
    inv.arg("-v").arg("-n")
}

/// Shared match section: `<op> <chain> -p <proto> --dport <port> [-s src] [-d dst]`
fn rule_matches(op: RuleOp, rule: &RuleSpec) -> Invocation {
    let mut inv = Invocation::new(rule.family.rules_tool())
        .arg(op.flag())
        .arg(rule.chain.as_str())
        .arg("-p")
        .arg(rule.protocol.as_ref())
        .arg("--dport")
        .arg(rule.port.to_string());
    if let Some(source) = rule.source {
        inv = inv.arg("-s").arg(source.to_string());
    }
    if let Some(destination) = rule.destination {
        inv = inv.arg("-d").arg(destination.to_string());
    }
    inv
}

/// The rule itself, jumping to its target
pub fn rule(op: RuleOp, rule: &RuleSpec) -> Invocation {
    rule_matches(op, rule).arg("-j").arg(rule.target.to_string())
}

/// The LOG rule paired with a `--log` rule.
///
/// iptables accepts a single `-j` per rule, so logging is a separate rule
/// with identical matches that jumps to LOG and falls through.
pub fn log_companion(op: RuleOp, spec: &RuleSpec, prefix: &str) -> Invocation {
    rule_matches(op, spec)
        .arg("-j")
        .arg("LOG")
        .arg("--log-prefix")
        .arg(prefix)
}

/// Ordered invocations for adding or deleting a rule.
///
/// The LOG companion sits directly before the action rule, so it is appended
/// first and deleted last.
pub fn rule_change(op: RuleOp, spec: &RuleSpec, log_prefix: Option<&str>) -> Vec<Invocation> {
    let main = rule(op, spec);
    match (log_prefix, op) {
        (None, _) => vec![main],
        (Some(prefix), RuleOp::Append) => vec![log_companion(op, spec, prefix), main],
        (Some(prefix), RuleOp::Delete) => vec![main, log_companion(op, spec, prefix)],
    }
}

/// `-save [-c]`; output goes to stdout and is captured by the caller
pub fn save(family: Family, counters: bool) -> Invocation {
    let inv = Invocation::new(family.save_tool());
    if counters { inv.arg("-c") } else { inv }
}

/// `-restore [-c] [--test] <file>`
pub fn restore(family: Family, path: &Path, counters: bool, test_only: bool) -> Invocation {
    let mut inv = Invocation::new(family.restore_tool());
    if counters {
        inv = inv.arg("-c");
    }
    if test_only {
        inv = inv.arg("--test");
    }
    inv.arg(path.to_string_lossy())
}

/// `install -D -m 644 <staged> <destination>`
pub fn install_file(staged: &Path, destination: &Path) -> Invocation {
    Invocation::new(Tool::Install)
        .arg("-D")
        .arg("-m")
        .arg("644")
        .arg(staged.to_string_lossy())
        .arg(destination.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ssh_rule() -> RuleSpec {
        RuleSpec::parse(Family::Ipv4, "INPUT", "tcp", "22", "ACCEPT", None, None).unwrap()
    }

    #[test]
    fn test_list_ipv4() {
        let inv = list(Family::Ipv4, None);
        assert_eq!(inv.tool, Tool::Iptables);
        assert_eq!(inv.args, ["-L", "-v", "-n"]);
    }

    #[test]
    fn test_list_ipv6_with_chain() {
        let chain: ChainName = "INPUT".parse().unwrap();
        let inv = list(Family::Ipv6, Some(&chain));
        assert_eq!(inv.tool, Tool::Ip6tables);
        assert_eq!(inv.args, ["-L", "INPUT", "-v", "-n"]);
    }

    #[test]
    fn test_append_minimal() {
        let inv = rule(RuleOp::Append, &ssh_rule());
        assert_eq!(
            inv.args,
            ["-A", "INPUT", "-p", "tcp", "--dport", "22", "-j", "ACCEPT"]
        );
    }

    #[test]
    fn test_delete_with_addresses() {
        let spec = RuleSpec::parse(
            Family::Ipv4,
            "FORWARD",
            "udp",
            "5000-5010",
            "drop",
            Some("10.0.0.0/8"),
            Some("192.168.1.10"),
        )
        .unwrap();
        let inv = rule(RuleOp::Delete, &spec);
        assert_eq!(
            inv.args,
            [
                "-D",
                "FORWARD",
                "-p",
                "udp",
                "--dport",
                "5000:5010",
                "-s",
                "10.0.0.0/8",
                "-d",
                "192.168.1.10/32",
                "-j",
                "DROP"
            ]
        );
    }

    #[test]
    fn test_log_companion_precedes_on_append() {
        let invs = rule_change(RuleOp::Append, &ssh_rule(), Some("Netfilter: "));
        assert_eq!(invs.len(), 2);
        assert_eq!(
            invs[0].args[invs[0].args.len() - 4..],
            ["-j", "LOG", "--log-prefix", "Netfilter: "]
        );
        assert_eq!(invs[1], rule(RuleOp::Append, &ssh_rule()));
    }

    #[test]
    fn test_log_companion_follows_on_delete() {
        let invs = rule_change(RuleOp::Delete, &ssh_rule(), Some("fw: "));
        assert_eq!(invs.len(), 2);
        assert_eq!(invs[0], rule(RuleOp::Delete, &ssh_rule()));
        assert_eq!(invs[1].args[0], "-D");
        assert!(invs[1].args.contains(&"LOG".to_string()));
    }

    #[test]
    fn test_rule_change_without_log() {
        let invs = rule_change(RuleOp::Append, &ssh_rule(), None);
        assert_eq!(invs, vec![rule(RuleOp::Append, &ssh_rule())]);
    }

    #[test]
    fn test_save_and_restore() {
        assert_eq!(save(Family::Ipv4, true).args, ["-c"]);
        assert!(save(Family::Ipv6, false).args.is_empty());
        assert_eq!(save(Family::Ipv6, false).tool, Tool::Ip6tablesSave);

        let inv = restore(Family::Ipv4, Path::new("/etc/iptables/rules.v4"), true, true);
        assert_eq!(inv.tool, Tool::IptablesRestore);
        assert_eq!(inv.args, ["-c", "--test", "/etc/iptables/rules.v4"]);
    }

    #[test]
    fn test_install_file() {
        let inv = install_file(Path::new("/tmp/x"), Path::new("/etc/iptables/rules.v4"));
        assert_eq!(inv.tool, Tool::Install);
        assert_eq!(
            inv.args,
            ["-D", "-m", "644", "/tmp/x", "/etc/iptables/rules.v4"]
        );
    }

    #[test]
    fn test_display_quotes_spaces() {
        let invs = rule_change(RuleOp::Append, &ssh_rule(), Some("Netfilter: "));
        assert_eq!(
            invs[0].to_string(),
            "iptables -A INPUT -p tcp --dport 22 -j LOG --log-prefix \"Netfilter: \""
        );
    }

    fn chain_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("INPUT".to_string()),
            Just("OUTPUT".to_string()),
            Just("FORWARD".to_string()),
            "[A-Za-z][A-Za-z0-9_.-]{0,27}",
        ]
    }

    proptest! {
        #[test]
        fn prop_flags_map_one_to_one(
            chain in chain_strategy(),
            proto in prop::sample::select(vec!["tcp", "udp", "sctp", "dccp", "udplite"]),
            port in 1u16..=65535,
            target in prop::sample::select(vec!["ACCEPT", "DROP", "REJECT", "RETURN"]),
            source in prop::option::of(any::<[u8; 4]>()),
            dest in prop::option::of(any::<[u8; 4]>()),
            ipv6 in any::<bool>(),
            deleting in any::<bool>(),
        ) {
            let family = Family::from_ipv6_flag(ipv6);
            let to_addr = |o: [u8; 4]| {
                if ipv6 {
                    format!("2001:db8::{:x}{:02x}", o[0], o[1])
                } else {
                    std::net::Ipv4Addr::from(o).to_string()
                }
            };
            let source = source.map(to_addr);
            let dest = dest.map(to_addr);
            let port_str = port.to_string();

            let spec = RuleSpec::parse(
                family, &chain, proto, &port_str, target, source.as_deref(), dest.as_deref(),
            ).unwrap();

            let (op, inv) = if deleting {
                ("-D", rule(RuleOp::Delete, &spec))
            } else {
                ("-A", rule(RuleOp::Append, &spec))
            };

            let mut expected: Vec<String> = vec![
                op.into(), chain.clone(), "-p".into(), proto.into(),
                "--dport".into(), port_str.clone(),
            ];
            if let Some(s) = spec.source {
                expected.push("-s".into());
                expected.push(s.to_string());
            }
            if let Some(d) = spec.destination {
                expected.push("-d".into());
                expected.push(d.to_string());
            }
            expected.push("-j".into());
            expected.push(target.into());

            prop_assert_eq!(inv.tool, family.rules_tool());
            prop_assert_eq!(inv.args, expected);
        }
    }
}
