//! # Waypoint CLI
//!
//! The `waypoint` binary is the host surface for the answering and sync
//! pipelines. A scheduler invokes `sync`; a chat-transport layer invokes
//! `ask`. All commands accept a `--config` flag pointing to a TOML
//! configuration file (see `config/waypoint.example.toml`).
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `waypoint init` | Create the checkpoint database schema |
//! | `waypoint tenants` | List configured tenants and their namespaces |
//! | `waypoint sync <tenant> <source>` | Run one sync pass (workspace or codehost) |
//! | `waypoint ask <tenant> "<query>"` | Classify, retrieve, and answer a question |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use waypoint::answer::answer_query;
use waypoint::config;
use waypoint::db;
use waypoint::migrate;
use waypoint::models::SourceKind;
use waypoint::sync::{trigger_sync, SyncOptions};

/// Waypoint — multi-tenant retrieval-augmented question answering over
/// workspace docs and code-host activity.
#[derive(Parser)]
#[command(
    name = "waypoint",
    about = "Multi-tenant retrieval-augmented question answering over workspace docs and code-host activity",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/waypoint.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the checkpoint database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List configured tenants and their index namespaces.
    Tenants,

    /// Run one sync pass for a tenant and source.
    ///
    /// Fetches documents changed since the last checkpoint, re-chunks and
    /// re-embeds them, and replaces their vectors in the tenant's index
    /// namespace.
    Sync {
        /// Tenant id as configured under `[tenants.<id>]`.
        tenant: String,

        /// Source to sync: `workspace` or `codehost`.
        source: SourceKind,

        /// Ignore the checkpoint — reprocess everything upstream reports.
        #[arg(long)]
        full: bool,

        /// Fetch and count chunks without writing to the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question for a tenant.
    Ask {
        /// Tenant id as configured under `[tenants.<id>]`.
        tenant: String,

        /// The question to answer.
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("waypoint=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Tenants => {
            for id in cfg.tenants.keys() {
                let tenant = cfg.resolve_tenant(id)?;
                println!("{}", tenant.id);
                if let Some(ws) = &tenant.workspace {
                    println!("  workspace: database {} -> {}", ws.database_id, ws.namespace);
                }
                if let Some(ch) = &tenant.codehost {
                    println!("  codehost:  {}/{} -> {}", ch.owner, ch.repo, ch.namespace);
                }
            }
        }
        Commands::Sync {
            tenant,
            source,
            full,
            dry_run,
        } => {
            let report = trigger_sync(&cfg, &tenant, source, SyncOptions { full, dry_run }).await?;

            if dry_run {
                println!("sync {}/{} (dry-run)", tenant, source);
                println!("  documents found: {}", report.processed + report.skipped);
                println!("  estimated chunks: {}", report.chunks_written);
            } else {
                println!("sync {}/{}", tenant, source);
                println!("  processed: {}", report.processed);
                println!("  skipped: {}", report.skipped);
                println!("  failed: {}", report.failed);
                println!("  chunks written: {}", report.chunks_written);
            }
            println!("ok");
        }
        Commands::Ask { tenant, query } => {
            // The CLI has no thread history; the transport layer supplies it
            // in service deployments.
            let reply = answer_query(&cfg, &tenant, &query, &[]).await?;
            println!("{}", reply);
        }
    }

    Ok(())
}
