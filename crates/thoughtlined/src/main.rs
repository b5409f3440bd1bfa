//! Thoughtline training worker
//!
//! ## Commands
//!
//! - `check`: probe the blob store and exit
//! - `mirror-spec`: copy a solver's external specification into the blob store
//! - `prepare`: lay out a solver's specification, data and manifests in a working directory
//!
//! Every command probes the blob store first and fails if it is unhealthy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use thoughtline_core::environment::{environment_sanity_check, ProbePolicy};
use thoughtline_core::{BlobStore, BlobStoreConfig, SolverArtifacts};
use thoughtline_state::{DocumentStore, GatewayConfig, SyncGatewayStore};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "thoughtlined")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Thoughtline training worker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Blob store location: http(s) CBFS URL, file:// URL or directory
    #[arg(long, env = "THOUGHTLINE_BLOB_URL", global = true)]
    blob_url: Option<String>,

    /// Document database URL
    #[arg(long, env = "THOUGHTLINE_DB_URL", global = true)]
    db_url: Option<String>,

    /// Document database user
    #[arg(long, env = "THOUGHTLINE_DB_USERNAME", global = true)]
    db_username: Option<String>,

    /// Document database password
    #[arg(long, env = "THOUGHTLINE_DB_PASSWORD", global = true, hide_env_values = true)]
    db_password: Option<String>,

    /// Blob store round trips attempted before giving up
    #[arg(long, default_value_t = thoughtline_core::environment::DEFAULT_MAX_ATTEMPTS, global = true)]
    probe_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the blob store and exit
    Check,

    /// Mirror a solver's specification into the blob store
    MirrorSpec {
        /// Solver document id
        #[arg(long)]
        solver: String,
    },

    /// Materialize a solver's specification and train/test data
    Prepare {
        /// Solver document id
        #[arg(long)]
        solver: String,

        /// Directory to write the specification, data and manifests into
        #[arg(long, default_value = ".")]
        work_dir: PathBuf,
    },
}

impl Cli {
    fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            max_attempts: self.probe_attempts,
            ..ProbePolicy::default()
        }
    }

    fn blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        let location = self
            .blob_url
            .as_deref()
            .context("blob store location not set (--blob-url or THOUGHTLINE_BLOB_URL)")?;
        let config = BlobStoreConfig::parse(location).map_err(anyhow::Error::msg)?;
        config.connect().context("Failed to open blob store")
    }

    fn document_store(&self) -> Result<Arc<dyn DocumentStore>> {
        let db_url = self
            .db_url
            .as_deref()
            .context("document database not set (--db-url or THOUGHTLINE_DB_URL)")?;
        let mut config = GatewayConfig::new(db_url);
        if let Some(user) = &self.db_username {
            config = config.with_credentials(user, self.db_password.as_deref().unwrap_or(""));
        }
        let store =
            SyncGatewayStore::new(config).context("Failed to set up document database client")?;
        Ok(Arc::new(store))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    thoughtline_core::init_tracing(cli.json, level);

    let blobs = cli.blob_store()?;
    cmd_check(&*blobs, cli.probe_policy()).await?;

    match &cli.command {
        Commands::Check => Ok(()),
        Commands::MirrorSpec { solver } => {
            let artifacts = SolverArtifacts::new(cli.document_store()?, blobs)?;
            cmd_mirror_spec(&artifacts, solver).await
        }
        Commands::Prepare { solver, work_dir } => {
            let artifacts = SolverArtifacts::new(cli.document_store()?, blobs)?;
            cmd_prepare(&artifacts, solver, work_dir, cli.json).await
        }
    }
}

async fn cmd_check(blobs: &dyn BlobStore, policy: ProbePolicy) -> Result<()> {
    environment_sanity_check(blobs, policy)
        .await
        .context("Blob store sanity check failed")
}

async fn cmd_mirror_spec(artifacts: &SolverArtifacts, solver_id: &str) -> Result<()> {
    let solver = artifacts
        .load_solver(solver_id)
        .await
        .with_context(|| format!("Failed to load solver {solver_id}"))?;
    let mirrored = artifacts
        .mirror_specification(&solver)
        .await
        .with_context(|| format!("Failed to mirror specification for solver {solver_id}"))?;

    info!(solver_id = %solver_id, url = %mirrored.specification_url, "specification mirrored");
    println!("{}", mirrored.specification_url);
    Ok(())
}

async fn cmd_prepare(
    artifacts: &SolverArtifacts,
    solver_id: &str,
    work_dir: &Path,
    json: bool,
) -> Result<()> {
    tokio::fs::create_dir_all(work_dir)
        .await
        .with_context(|| format!("Failed to create working directory {}", work_dir.display()))?;

    let prepared = artifacts
        .prepare_workspace(solver_id, work_dir)
        .await
        .with_context(|| format!("Failed to prepare workspace for solver {solver_id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prepared)?);
        return Ok(());
    }
    println!("specification: {}", prepared.specification.display());
    for split in [&prepared.training, &prepared.test] {
        println!(
            "{}: {} files, {} classes",
            split.manifest_path.display(),
            split.entries.len(),
            split.class_count()
        );
    }
    Ok(())
}
