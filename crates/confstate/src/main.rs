mod cli; // Declare the cli module

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser; // Use clap for argument parsing
use log::{debug, error};
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

use confstate_core::kernel::constants::SETTINGS_FILE_NAME;
use confstate_core::kernel::error::Result;
use confstate_core::storage::{CustomStorageRegistry, ManagerSettings, StateStorageManager};

use crate::cli::Command;

/// Confstate: inspect and edit keyed state storages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Settings file (JSON, YAML or TOML). Defaults to `<root>/confstate.toml` if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root configuration directory, installed as `$ROOT_CONFIG$`
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Accept storage files without an extension
    #[arg(long, global = true)]
    headless: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(verbose: bool) {
    // Route `log` records from the core into tracing
    if let Err(e) = LogTracer::init() {
        eprintln!("Failed to install log bridge: {}", e);
    }
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}

fn load_settings(args: &CliArgs) -> Result<ManagerSettings> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()
            .map_err(|e| confstate_core::Error::io(e, "current_dir", PathBuf::from(".")))?
            .join(".confstate"),
    };

    let config = args
        .config
        .clone()
        .or_else(|| Some(root.join(SETTINGS_FILE_NAME)).filter(|p| p.is_file()));
    let mut settings = match config {
        Some(path) => {
            debug!("Loading settings from {}", path.display());
            ManagerSettings::load(&path)?
        }
        None => ManagerSettings::default(),
    };

    // An explicit --root wins over the settings file; otherwise keep a configured root
    if args.root.is_some() || settings.root().is_none() {
        settings = settings.with_root(&root);
    }
    settings.headless |= args.headless;
    Ok(settings)
}

fn build_manager(settings: &ManagerSettings) -> Result<StateStorageManager> {
    let mut registry = CustomStorageRegistry::new();
    session_storage::register(&mut registry)?;
    StateStorageManager::builder()
        .name("confstate-cli")
        .settings(settings)
        .registry(registry)
        .build()
}

fn run(args: CliArgs) -> Result<()> {
    let settings = load_settings(&args)?;
    let manager = build_manager(&settings)?;
    cli::execute(&manager, args.command)
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
