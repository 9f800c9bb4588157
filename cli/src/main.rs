//! BlockMirror — keeps the most recent window of chain blocks mirrored into a
//! capped SQLite store.
//!
//! # Usage
//! ```text
//! blockmirror --bulk-rpc <url> --store <path> [--blocks 10000] [--catch-up sequential]
//! ```
//!
//! Start-up: catch up from the stored head to the chain head with batched
//! requests, then follow `newHeads` and store every announced block.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use blockmirror_core::config::{DEFAULT_AVG_DOC_SIZE_KB, DEFAULT_CHAIN_RPC, DEFAULT_WINDOW, DEFAULT_WS};
use blockmirror_core::{CatchUpMode, MirrorConfig, SecretValue};
use blockmirror_rpc::{BulkRpcClient, HttpRpcClient};
use blockmirror_storage::SqliteBlockStore;
use blockmirror_sync::{BlockWorker, LiveFeed, Reconciler, WorkerConfig};

mod logging;

use logging::{init_tracing, LogConfig};

#[derive(Parser)]
#[command(
    name = "blockmirror",
    about = "Mirror a bounded window of recent blocks into a capped store",
    long_about = "
BlockMirror: batched catch-up over a bulk JSON-RPC provider, then live
ingestion from a newHeads WebSocket subscription. Old blocks are evicted
by the store once the configured window is full.

ENVIRONMENT VARIABLES:
  AVAX_RPC            Chain JSON-RPC endpoint
  AVAX_WS             newHeads WebSocket endpoint
  AVAX_RPC_INFURA     Batch-capable bulk endpoint (required)
  BLOCKMIRROR_STORE   SQLite path or URL (required)
  BLOCKS              Retention window in blocks
  AVG_DOC_SIZE        Average block document size in KB
  CATCH_UP_MODE       sequential | concurrent
  RUST_LOG            Log filter (default: info)
",
    version
)]
struct Cli {
    /// Chain JSON-RPC endpoint (head polling, block by hash)
    #[arg(long = "chain-rpc", env = "AVAX_RPC", default_value = DEFAULT_CHAIN_RPC)]
    chain_rpc: String,

    /// newHeads subscription endpoint
    #[arg(long, env = "AVAX_WS", default_value = DEFAULT_WS)]
    ws: String,

    /// Batch-capable endpoint used for catch-up
    #[arg(long = "bulk-rpc", env = "AVAX_RPC_INFURA", hide_env_values = true)]
    bulk_rpc: String,

    /// SQLite path (./blocks.db) or URL (sqlite:./blocks.db?mode=rwc)
    #[arg(long, env = "BLOCKMIRROR_STORE", hide_env_values = true)]
    store: String,

    /// Retention window in blocks
    #[arg(long, env = "BLOCKS", default_value_t = DEFAULT_WINDOW)]
    blocks: u64,

    /// Average document size estimate in KB, used for the byte budget
    #[arg(long = "avg-doc-size", env = "AVG_DOC_SIZE", default_value_t = DEFAULT_AVG_DOC_SIZE_KB)]
    avg_doc_size: u64,

    /// Run catch-up before the live feed, or alongside it
    #[arg(long = "catch-up", env = "CATCH_UP_MODE", value_enum, default_value_t = CatchUpArg::Sequential)]
    catch_up: CatchUpArg,

    /// Drop in-flight live blocks on shutdown instead of retrying them
    #[arg(long)]
    abandon_on_shutdown: bool,

    /// Emit JSON structured logs
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CatchUpArg {
    Sequential,
    Concurrent,
}

impl From<CatchUpArg> for CatchUpMode {
    fn from(arg: CatchUpArg) -> Self {
        match arg {
            CatchUpArg::Sequential => CatchUpMode::Sequential,
            CatchUpArg::Concurrent => CatchUpMode::Concurrent,
        }
    }
}

impl Cli {
    fn into_config(self) -> MirrorConfig {
        MirrorConfig {
            chain_rpc_url: self.chain_rpc,
            bulk_rpc_url: SecretValue::new(self.bulk_rpc),
            ws_url: self.ws,
            store_url: SecretValue::new(self.store),
            window: self.blocks,
            avg_doc_size_kb: self.avg_doc_size,
            catch_up: self.catch_up.into(),
            abandon_on_shutdown: self.abandon_on_shutdown,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        json: cli.log_json,
        ..LogConfig::default()
    });

    match run(cli.into_config()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "blockmirror stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: MirrorConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let capacity = config.capacity()?;

    info!(
        chain_rpc = %config.chain_rpc_url,
        bulk_rpc = %config.bulk_rpc_url,
        ws = %config.ws_url,
        window = config.window,
        max_bytes = capacity.max_bytes,
        catch_up = %config.catch_up,
        "starting blockmirror"
    );

    let store = Arc::new(
        SqliteBlockStore::open(config.store_url.expose(), capacity)
            .await
            .context("opening block store")?,
    );
    let chain = Arc::new(HttpRpcClient::default_for(config.chain_rpc_url.clone())?);
    let bulk = Arc::new(BulkRpcClient::default_for(config.bulk_rpc_url.clone())?);

    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(chain.clone(), bulk, store.clone(), config.window);
    let worker = BlockWorker::new(
        chain,
        store.clone(),
        WorkerConfig {
            abandon_on_shutdown: config.abandon_on_shutdown,
            ..WorkerConfig::default()
        },
        shutdown.clone(),
    );

    match config.catch_up {
        CatchUpMode::Sequential => {
            let report = reconciler.run().await.context("catch-up failed")?;
            info!(?report, "catch-up finished, starting live feed");
        }
        CatchUpMode::Concurrent => {
            tokio::spawn(async move {
                match reconciler.run().await {
                    Ok(report) => info!(?report, "background catch-up finished"),
                    Err(e) => error!(error = %e, "background catch-up failed"),
                }
            });
        }
    }

    let feed = LiveFeed::connect(config.ws_url.clone(), worker)
        .await
        .context("opening live feed")?;

    let outcome = tokio::select! {
        _ = feed.done() => Err(anyhow!("live feed connection ended")),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "signal handler failed, shutting down"),
            }
            Ok(())
        }
    };

    feed.close().await;
    shutdown.cancel();
    store.close().await;
    info!(dispatched = feed.dispatched(), "blockmirror stopped");

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["blockmirror"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_build_config() {
        let config = parse(&[
            "--bulk-rpc",
            "https://avalanche-mainnet.infura.io/v3/key",
            "--store",
            "./blocks.db",
            "--blocks",
            "500",
            "--avg-doc-size",
            "20",
            "--catch-up",
            "concurrent",
            "--abandon-on-shutdown",
        ])
        .into_config();

        assert_eq!(config.window, 500);
        assert_eq!(config.avg_doc_size_kb, 20);
        assert_eq!(config.catch_up, CatchUpMode::Concurrent);
        assert!(config.abandon_on_shutdown);
        assert_eq!(config.store_url.expose(), "./blocks.db");
        assert_eq!(config.capacity().unwrap().max_bytes, 500 * 20 * 1000);
        config.validate().unwrap();
    }

    #[test]
    fn bulk_secret_does_not_leak_into_logs() {
        let config = parse(&["--bulk-rpc", "https://x/v3/secret", "--store", "b.db"]).into_config();
        assert!(!format!("{config:?}").contains("secret"));
        assert_eq!(config.bulk_rpc_url.to_string(), "********");
    }
}
