use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ltm_reconciler::apply::{apply_manifest, destroy_manifest};
use ltm_reconciler::config::ReconcilerConfig;
use ltm_reconciler::controller;
use ltm_reconciler::resource::Manifest;
use ltm_reconciler::store::{IControlClient, InMemoryStore, StateStore};
use ltm_reconciler::telemetry;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true, env = "LTM_CONFIG")]
    config: Option<PathBuf>,

    /// Management API base URL
    #[arg(long, global = true, env = "LTM_URL")]
    url: Option<String>,

    #[arg(long, global = true, env = "LTM_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "LTM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Partition used for resources that do not name one
    #[arg(long, global = true, env = "LTM_PARTITION")]
    partition: Option<String>,

    /// Log as JSON
    #[arg(long, global = true, env = "LTM_LOG_JSON")]
    log_json: bool,

    /// Run against an empty in-memory store and log the calls that would be made
    #[arg(long, global = true)]
    offline: bool,

    /// Print Prometheus metrics after the command finishes
    #[cfg(feature = "metrics")]
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or converge every node and pool in a manifest
    Apply(ManifestArgs),
    /// Delete every pool and node in a manifest
    Destroy(ManifestArgs),
    /// Delete a node, removing blocking pool memberships first
    DeleteNode {
        /// Node name
        name: String,
    },
    /// Print a pool and its members as JSON
    ShowPool {
        /// Pool name
        name: String,
    },
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ManifestArgs {
    /// Manifest file (YAML)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Commands::Version = args.command {
        println!("ltm-reconciler v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    telemetry::init_logging(args.log_json);
    let config = load_config(&args)?;

    if args.offline {
        info!("Running offline against an in-memory store");
        let store = InMemoryStore::new();
        let result = run(&store, &config, &args.command).await;
        for call in store.calls() {
            info!("offline call: {:?}", call);
        }
        result?;
    } else {
        let store = IControlClient::new(&config.store)
            .context("Failed to build management API client")?;
        run(&store, &config, &args.command).await?;
    }

    #[cfg(feature = "metrics")]
    if args.print_metrics {
        print!("{}", controller::metrics::encode_metrics());
    }

    Ok(())
}

/// Config file first, then flags and environment on top
fn load_config(args: &Args) -> anyhow::Result<ReconcilerConfig> {
    let mut config = match &args.config {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ReconcilerConfig::default(),
    };

    if let Some(url) = &args.url {
        config.store.url = url.clone();
    }
    if let Some(username) = &args.username {
        config.store.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.store.password = password.clone();
    }
    if let Some(partition) = &args.partition {
        config.default_partition = partition.clone();
    }

    config.validate().context("Invalid configuration")?;
    debug!(
        "Using store {} as {} (default partition {})",
        config.store.url, config.store.username, config.default_partition
    );
    Ok(config)
}

async fn run<S: StateStore + ?Sized>(
    store: &S,
    config: &ReconcilerConfig,
    command: &Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Apply(manifest_args) => {
            let manifest = read_manifest(&manifest_args.file)?;
            let report = apply_manifest(store, config, &manifest).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Destroy(manifest_args) => {
            let manifest = read_manifest(&manifest_args.file)?;
            let report = destroy_manifest(store, config, &manifest).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::DeleteNode { name } => {
            let outcome = controller::delete_node(store, config, name, None).await?;
            println!(
                "Deleted node {} ({} membership(s) removed in {} round(s))",
                name, outcome.memberships_removed, outcome.rounds
            );
        }
        Commands::ShowPool { name } => {
            let pool = controller::read_pool(store, config, name, None)
                .await?
                .with_context(|| {
                    format!("Pool {}/{} not found", config.default_partition, name)
                })?;
            println!("{}", serde_json::to_string_pretty(&pool)?);
        }
        Commands::Version => {}
    }
    Ok(())
}

fn read_manifest(path: &Path) -> anyhow::Result<Manifest> {
    Manifest::from_file(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))
}
