//! Engine Hardware Preparation CLI
//!
//! Discovers fabric interfaces and prepares or resets NVMe devices for the
//! storage engine.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engine_hwprep::{
    BdevPrepareRequest, BdevPreparer, BdevProvider, Error, FabricDiscoverer, FabricProvider,
    HwPrepConfig, Result,
};
use engine_hwprep::domain::FabricDiscovererRef;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Engine hardware preparation - fabric discovery and NVMe device setup
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, short, env = "HWPREP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fabric interface discovery
    #[command(subcommand)]
    Fabric(FabricCommand),

    /// NVMe block device preparation
    #[command(subcommand)]
    Bdev(BdevCommand),
}

#[derive(Subcommand, Debug)]
enum FabricCommand {
    /// List fabric interfaces and their providers
    Scan {
        /// Give up after this many seconds (overrides config, 0 waits forever)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum BdevCommand {
    /// Reset then bind devices and allocate hugepages
    Prepare(PrepareArgs),

    /// Release devices back to the kernel
    Reset(PrepareArgs),
}

#[derive(ClapArgs, Debug)]
struct PrepareArgs {
    /// Account the engine runs as
    #[arg(long, short = 'u', env = "HWPREP_TARGET_USER")]
    target_user: String,

    /// Number of hugepages to allocate (0 uses the default)
    #[arg(long, default_value_t = 0)]
    hugepages: u32,

    /// Keep stale hugepage files
    #[arg(long)]
    disable_clean_hugepages: bool,

    /// Comma separated PCI addresses to claim
    #[arg(long, default_value = "")]
    pci_allowlist: String,

    /// Comma separated PCI addresses to leave alone
    #[arg(long, default_value = "")]
    pci_blocklist: String,

    /// Use the generic UIO driver instead of VFIO
    #[arg(long)]
    disable_vfio: bool,

    /// Do not add VMD addresses to the allow-list
    #[arg(long)]
    disable_vmd: bool,

    /// Setup script (overrides config)
    #[arg(long, env = "HWPREP_SETUP_SCRIPT")]
    setup_script: Option<PathBuf>,
}

impl PrepareArgs {
    fn request(&self) -> BdevPrepareRequest {
        BdevPrepareRequest {
            target_user: self.target_user.clone(),
            hugepage_count: self.hugepages,
            disable_clean_hugepages: self.disable_clean_hugepages,
            pci_allowlist: self.pci_allowlist.clone(),
            pci_blocklist: self.pci_blocklist.clone(),
            disable_vfio: self.disable_vfio,
            disable_vmd: self.disable_vmd,
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);
    debug!("{} {}", engine_hwprep::NAME, engine_hwprep::VERSION);

    let mut config = match &args.config {
        Some(path) => HwPrepConfig::from_file(path)?,
        None => HwPrepConfig::default(),
    };

    let result = match args.command {
        Command::Fabric(FabricCommand::Scan { timeout_secs, json }) => {
            if let Some(secs) = timeout_secs {
                config.fabric.query_timeout_secs = secs;
            }
            scan_fabric(&config, json).await
        }
        Command::Bdev(cmd) => run_bdev(&mut config, cmd).await,
    };

    if let Err(e) = &result {
        error!("{}", e);
        if e.is_transient() {
            warn!("The failure may clear up if the command is run again");
        }
    }
    result
}

async fn scan_fabric(config: &HwPrepConfig, json: bool) -> Result<()> {
    let discoverer: FabricDiscovererRef = Arc::new(FabricProvider::from_config(&config.fabric));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let interfaces = discoverer.get_fabric_interfaces(&cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&interfaces)?);
        return Ok(());
    }

    for iface in interfaces.iter() {
        let providers: Vec<&str> = iface.providers().iter().map(String::as_str).collect();
        let os_device = if iface.os_device().is_empty() {
            "-"
        } else {
            iface.os_device()
        };
        println!("{:<16} {:<12} {}", iface.name(), os_device, providers.join(", "));
    }
    Ok(())
}

async fn run_bdev(config: &mut HwPrepConfig, cmd: BdevCommand) -> Result<()> {
    let (args, is_prepare) = match cmd {
        BdevCommand::Prepare(args) => (args, true),
        BdevCommand::Reset(args) => (args, false),
    };
    if let Some(script) = &args.setup_script {
        config.bdev.setup_script_path = Some(script.clone());
    }

    let provider = BdevProvider::from_config(&config.bdev)?;
    let req = args.request();

    // The script blocks for as long as device binding takes
    tokio::task::spawn_blocking(move || {
        if is_prepare {
            let resp = provider.prepare(&req)?;
            info!("Removed {} stale hugepage files", resp.nr_hugepages_removed);
            Ok(())
        } else {
            provider.reset(&req)
        }
    })
    .await
    .map_err(|e| Error::Internal(format!("bdev task failed: {}", e)))?
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
