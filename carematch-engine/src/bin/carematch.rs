//! carematch engine CLI
//!
//! Serves the matching engine's REST surface with the background
//! expiry sweeper, or runs one-off engine commands for operations.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use carematch_engine::api::context::UserContext;
use carematch_engine::engine::{Engine, MatchShiftOptions};
use carematch_engine::ids::{OrganizationId, ShiftId};
use carematch_engine::ml::{HttpInferenceClient, InferenceClient};
use carematch_engine::notify::LoggingNotifier;
use carematch_engine::store::{MemoryStore, SledStore, Store};
use carematch_engine::sweeper::Sweeper;

#[derive(Parser)]
#[command(name = "carematch")]
#[command(about = "Matching and assignment engine for home-care scheduling")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use the in-memory store instead of the durable one
    #[arg(long)]
    memory: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API with the background sweeper
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        addr: Option<String>,
    },

    /// Run one expiry sweep and exit
    Sweep,

    /// Run the evaluator for one shift and print the ranking
    MatchShift {
        /// Shift ID
        shift_id: String,
        /// Organization ID acting as the caller
        #[arg(long)]
        organization: String,
        /// Write proposals for the top candidates
        #[arg(long)]
        propose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = carematch_config::load_config().context("failed to load configuration")?;

    let store: Arc<dyn Store> = if cli.memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            SledStore::open(&config.storage.data_dir)
                .context("failed to open the durable store")?,
        )
    };

    let inference: Option<Arc<dyn InferenceClient>> = match (&config.ml.enabled, &config.ml.inference_url) {
        (true, Some(url)) => Some(Arc::new(
            HttpInferenceClient::new(url.clone(), config.ml.inference_timeout_ms)
                .context("failed to build the inference client")?,
        )),
        _ => None,
    };

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::new(LoggingNotifier),
        inference,
        &config,
    ));

    match cli.command {
        Commands::Serve { addr } => {
            let addr: std::net::SocketAddr = addr
                .unwrap_or_else(|| config.http.addr.clone())
                .parse()
                .context("invalid listen address")?;
            let sweeper = Sweeper::spawn(
                Arc::clone(engine.manager()),
                std::time::Duration::from_secs(config.engine.expiry_sweep_interval_secs),
            );
            let server = carematch_engine::api::RestApiServer::new(Arc::clone(&engine));
            let serve = server.serve(addr);
            tokio::select! {
                result = serve => {
                    result.context("server stopped")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
            }
            sweeper.shutdown().await;
        }

        Commands::Sweep => {
            let now = chrono::Utc::now();
            let sweep = engine
                .manager()
                .expire_stale(now)
                .await
                .context("sweep failed")?;
            println!(
                "expired {} proposal(s), reopened {} shift(s)",
                sweep.expired.len(),
                sweep.reopened_shifts.len()
            );
        }

        Commands::MatchShift {
            shift_id,
            organization,
            propose,
        } => {
            let shift_id = ShiftId::parse_str(&shift_id).context("invalid shift id")?;
            let organization_id =
                OrganizationId::parse_str(&organization).context("invalid organization id")?;
            let ctx = UserContext::admin(organization_id);
            let run = engine
                .match_shift(
                    &ctx,
                    shift_id,
                    MatchShiftOptions {
                        auto_propose: propose,
                        ..Default::default()
                    },
                )
                .await
                .context("match failed")?;
            for candidate in &run.candidates {
                println!(
                    "{}  score {:3}  {:?}{}",
                    candidate.caregiver_id,
                    candidate.overall_score,
                    candidate.quality,
                    if candidate.is_eligible {
                        String::new()
                    } else {
                        format!(
                            "  [{} issue(s)]",
                            candidate
                                .issues
                                .iter()
                                .filter(|i| {
                                    i.severity == carematch_engine::scoring::IssueSeverity::Blocking
                                })
                                .count()
                        )
                    }
                );
            }
            println!("{} proposal(s) written", run.proposals.len());
        }
    }

    Ok(())
}
