// Operator tool: bulk-clear store collections, dump recent snapshots.
//
// Usage: pnode-admin [--store-url URL] clear <snapshots|history|pods|all>
//        pnode-admin [--store-url URL] recent [--limit N]
//        pnode-admin [--store-url URL] pods

use anyhow::Context;
use clap::{Parser, Subcommand};
use pnode_monitor::config::{AppConfig, STORE_URL_ENV};
use pnode_monitor::snapshot_store::{Collection, SnapshotStore};

#[derive(Parser)]
#[command(name = "pnode-admin")]
#[command(about = "Maintenance commands for the pNode monitor snapshot store")]
#[command(version = pnode_monitor::version::VERSION)]
struct Cli {
    /// Store URL; falls back to STORE_URL, then store.url in CONFIG_FILE.
    #[arg(long, env = STORE_URL_ENV)]
    store_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every document in a collection, then VACUUM
    Clear {
        /// snapshots, history, pods, or all
        collection: Collection,
    },

    /// Print the newest snapshots as JSON, oldest first
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },

    /// Print the newest stored pod-credit document with its fetch time
    Pods,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let url = match cli.store_url {
        Some(url) => url,
        None => AppConfig::load()
            .context("no --store-url and no usable config file")?
            .store
            .url
            .with_context(|| format!("{} is not set and config has no store.url", STORE_URL_ENV))?,
    };

    let store = SnapshotStore::connect(&url).await?;
    store.init().await?;

    match cli.command {
        Commands::Clear { collection } => {
            let removed = store.clear(collection).await?;
            store.vacuum().await?;
            println!("cleared {}: {} documents removed", collection, removed);
        }
        Commands::Recent { limit } => {
            let snapshots = store.recent_snapshots(limit).await?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
        Commands::Pods => match store.latest_pods().await? {
            Some((fetched_at, document)) => {
                let out = serde_json::json!({ "fetchedAt": fetched_at, "document": document });
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
            None => println!("no pod-credit documents stored"),
        },
    }
    store.close().await;
    Ok(())
}
