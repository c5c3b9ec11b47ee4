//! netsimpler - command-line front end for Linux Netfilter (iptables)
//!
//! # Usage
//!
//! ```bash
//! netsimpler list                                  # iptables -L -v -n
//! netsimpler list --ipv6                           # ip6tables -L -v -n
//! netsimpler add INPUT tcp 22 ACCEPT --source 10.0.0.0/8 --log
//! netsimpler delete INPUT tcp 22 ACCEPT --source 10.0.0.0/8 --log
//! netsimpler save                                  # -> /etc/iptables/rules.v4
//! netsimpler load                                  # verify, back up, restore
//! netsimpler verify --ipv6                         # dry-run rules.v6
//! netsimpler history -n 20                         # recent audit events
//! ```
//!
//! # Security
//!
//! - Runs as an unprivileged user, elevating only the iptables tools
//! - All inputs validated before elevation
//! - Audit trail of all privileged operations

use clap::{Args, Parser, Subcommand};
use netsimpler::audit::AuditLog;
use netsimpler::config::{self, AppConfig};
use netsimpler::core::error::{Error, IptablesErrorPattern, Result};
use netsimpler::core::iptables;
use netsimpler::core::rule::{ChainName, Family, RuleSpec};
use netsimpler::core::verify;
use netsimpler::{elevation, validators};
use std::process::ExitCode;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "netsimpler")]
#[command(about = "Enhanced CLI for Linux Netfilter (iptables) management", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    /// Print debug logging (including every command run) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List iptables rules
    List {
        /// Only list this chain
        chain: Option<String>,
        /// List IPv6 rules
        #[arg(long)]
        ipv6: bool,
    },
    /// Add an iptables rule
    Add {
        #[command(flatten)]
        rule: RuleArgs,
        /// Enable logging for this rule
        #[arg(long)]
        log: bool,
    },
    /// Delete an iptables rule
    Delete {
        #[command(flatten)]
        rule: RuleArgs,
        /// Also delete the LOG rule created by `add --log`
        #[arg(long)]
        log: bool,
    },
    /// Save current iptables rules for persistence
    Save {
        /// Save IPv6 rules
        #[arg(long)]
        ipv6: bool,
    },
    /// Load saved iptables rules
    Load {
        /// Load IPv6 rules
        #[arg(long)]
        ipv6: bool,
        /// Skip the backup of the live rules
        #[arg(long)]
        no_backup: bool,
    },
    /// Check the saved rules file without loading it
    Verify {
        /// Verify the IPv6 rules file
        #[arg(long)]
        ipv6: bool,
    },
    /// Show recent audit log entries
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
struct RuleArgs {
    /// Chain (e.g., INPUT, OUTPUT, FORWARD)
    chain: String,
    /// Protocol (e.g., tcp, udp)
    protocol: String,
    /// Port number or range (e.g., 22, 8000:9000)
    port: String,
    /// Action (e.g., ACCEPT, DROP)
    action: String,
    /// Source IP address or network
    #[arg(long)]
    source: Option<String>,
    /// Destination IP address or network
    #[arg(long)]
    dest: Option<String>,
    /// Apply to IPv6
    #[arg(long)]
    ipv6: bool,
}

impl RuleArgs {
    fn to_spec(&self) -> Result<RuleSpec> {
        RuleSpec::parse(
            Family::from_ipv6_flag(self.ipv6),
            &self.chain,
            &self.protocol,
            &self.port,
            &self.action,
            self.source.as_deref(),
            self.dest.as_deref(),
        )
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_cli(command: Commands) -> Result<()> {
    let config = config::load_config().await;

    match command {
        Commands::List { chain, ipv6 } => {
            let chain = chain.as_deref().map(str::parse::<ChainName>).transpose()?;
            note_elevation();
            let listing = iptables::list_rules(Family::from_ipv6_flag(ipv6), chain.as_ref()).await?;
            print!("{listing}");
        }
        Commands::Add { rule, log } => {
            let spec = rule.to_spec()?;
            note_rule_hints(&spec);
            note_elevation();
            let output = iptables::add_rule(&config, &spec, log).await?;
            print_tool_output(&output);
            if log {
                println!("✓ Rule added to {} (with LOG)", spec.chain);
            } else {
                println!("✓ Rule added to {}", spec.chain);
            }
        }
        Commands::Delete { rule, log } => {
            let spec = rule.to_spec()?;
            note_elevation();
            let output = iptables::delete_rule(&config, &spec, log).await?;
            print_tool_output(&output);
            println!("✓ Rule deleted from {}", spec.chain);
        }
        Commands::Save { ipv6 } => {
            note_elevation();
            let outcome = iptables::save_rules(&config, Family::from_ipv6_flag(ipv6)).await?;
            println!(
                "✓ Saved {} bytes of rules to {}",
                outcome.bytes,
                outcome.path.display()
            );
            println!("  sha256 {}", outcome.checksum);
        }
        Commands::Load { ipv6, no_backup } => {
            note_elevation();
            let outcome =
                iptables::load_rules(&config, Family::from_ipv6_flag(ipv6), !no_backup).await?;
            print_tool_output(&outcome.output);
            println!("✓ Loaded rules from {}", outcome.path.display());
            if let Some(backup) = outcome.backup {
                println!("  Previous rules backed up to {}", backup.display());
            }
        }
        Commands::Verify { ipv6 } => {
            let family = Family::from_ipv6_flag(ipv6);
            note_elevation();
            verify::ensure_valid(&config, family).await?;
            println!("✓ {} is valid", config.rules_path(family).display());
        }
        Commands::History { count } => {
            let audit = AuditLog::new()?;
            let events = audit.read_recent(count).await?;
            if events.is_empty() {
                println!("No audit events in {}", audit.path().display());
            }
            for event in events {
                let mark = if event.success { "✓" } else { "✗" };
                println!(
                    "{} {mark} {:<12} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type.to_string(),
                    event.details
                );
                if let Some(error) = event.error {
                    println!("    {error}");
                }
            }
        }
        Commands::Config { init } => show_config(&config, init).await?,
    }
    Ok(())
}

async fn show_config(config: &AppConfig, init: bool) -> Result<()> {
    if init {
        match config::save_config(config).await? {
            Some(path) => println!("✓ Wrote {}", path.display()),
            None => return Err(Error::Internal("Config directory not found".to_string())),
        }
    } else if let Some(path) = config::config_path() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_tool_output(output: &str) {
    let trimmed = output.trim_end();
    if !trimmed.is_empty() {
        println!("{trimmed}");
    }
}

fn note_elevation() {
    if !elevation::runs_without_prompt() {
        tracing::info!("Not running as root; elevating via run0/sudo/pkexec");
    }
}

fn note_rule_hints(spec: &RuleSpec) {
    if let Some(hint) = validators::check_well_known_port(spec.port.first()) {
        tracing::info!("{hint}");
    }
    for net in spec.source.iter().chain(spec.destination.iter()) {
        if let Some(hint) = validators::check_reserved_ip(*net) {
            tracing::info!("{net}: {hint}");
        }
    }
}

/// Prints the captured error text, then a translated hint on stderr.
fn report_error(err: &Error) {
    match err {
        Error::Validation { .. } | Error::RulesFileNotFound(_) => eprintln!("Error: {err}"),
        _ => {
            let captured = err.captured_text();
            println!("Error executing command: {captured}");

            let translation = IptablesErrorPattern::match_error(&format!("{err}\n{captured}"));
            eprintln!();
            eprintln!("{}", translation.user_message);
            for suggestion in &translation.suggestions {
                eprintln!("  • {suggestion}");
            }
            if let Some(url) = &translation.help_url {
                eprintln!("  See: {url}");
            }
        }
    }
}
