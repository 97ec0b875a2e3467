//! fwprobe - Automated Firewall Rule Tester
//!
//! Applies a declared rule set with iptables, probes each rule with hping3,
//! and reports where the firewall's behavior differs from the declaration.
//!
//! # Usage
//!
//! ```bash
//! fwprobe --reset-firewall                 # Flush all iptables rules
//! fwprobe --apply-rules                    # Apply rules/sample_rules.json
//! fwprobe --apply-rules --dry-run          # Print the iptables commands only
//! fwprobe --validate-rules                 # Probe, summarize, write report
//! fwprobe --generate-report                # Re-render the last validation
//! fwprobe --validate-rules --rules prod.json --report out/prod.html
//! ```
//!
//! # Security
//!
//! - iptables and hping3 are the only programs run with elevation
//! - Arguments are passed without shell interpretation
//! - Audit trail of every privileged operation

use clap::{ArgGroup, Parser};
use fwprobe::config::{self, AppConfig, Overrides};
use fwprobe::session::{Mode, Session};
use fwprobe::{logging, utils};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "fwprobe", version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
#[command(about = "Automated Firewall Rule Tester", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .args(["apply_rules", "reset_firewall", "validate_rules", "generate_report"])
        .multiple(false)
))]
struct Cli {
    /// Apply firewall rules from the rules JSON file
    #[arg(long)]
    apply_rules: bool,
    /// Reset the firewall by flushing all rules
    #[arg(long)]
    reset_firewall: bool,
    /// Validate firewall rules and generate a report
    #[arg(long)]
    validate_rules: bool,
    /// Generate an HTML report from the last validation
    #[arg(long)]
    generate_report: bool,

    /// Rules JSON file
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,
    /// HTML report destination
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Log file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Host to send probe traffic to
    #[arg(long, value_name = "HOST")]
    target: Option<String>,
    /// Per-probe timeout (seconds, max: 300)
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Print the commands that would run instead of running them
    #[arg(long)]
    dry_run: bool,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn mode(&self) -> Option<Mode> {
        if self.reset_firewall {
            Some(Mode::Reset)
        } else if self.apply_rules {
            Some(Mode::Apply)
        } else if self.validate_rules {
            Some(Mode::Validate)
        } else if self.generate_report {
            Some(Mode::Report)
        } else {
            None
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            rules_file: self.rules.clone(),
            report_file: self.report.clone(),
            log_file: self.log_file.clone(),
            target: self.target.clone(),
            probe_timeout_secs: self.timeout,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> fwprobe::Result<()> {
    // Read before logging exists; any problem is reported once it does
    let (config, config_error) = match config::load_config().await {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    let config = config.with_overrides(cli.overrides());

    logging::init(&config.log_file, cli.verbose);
    info!(
        version = build::PKG_VERSION,
        commit = build::SHORT_COMMIT,
        built = build::BUILD_TIME,
        "fwprobe starting"
    );
    if let Some(e) = config_error {
        warn!("Using default configuration: {e}");
        eprintln!("Warning: {e}; using defaults");
    }

    Session::new(config, utils::get_state_dir())
        .with_dry_run(cli.dry_run)
        .run(cli.mode(), &mut std::io::stdout())
        .await
}

fn print_error(e: &fwprobe::Error) {
    eprintln!("Error: {e}");
    if let Some(translation) = e.translation() {
        eprintln!("  {}", translation.user_message);
        for suggestion in &translation.suggestions {
            eprintln!("  - {suggestion}");
        }
        if let Some(url) = &translation.help_url {
            eprintln!("  See: {url}");
        }
    }
}
