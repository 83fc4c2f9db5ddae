//! anomaly-sync — recompute the anomaly likelihood meta-features for a set
//! of employees and synchronize them into `user_features`.
//!
//! Prints the resulting sync report as JSON on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};

use likelihood_compute::{AnomalyFeature, SyncOutcome};
use likelihood_core::config::load_dotenv;
use likelihood_core::{Config, RecipeConfig};
use likelihood_store::{init_pg_pool, ActivityDirectory, PgFeatureStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Derive anomaly likelihood features and write the differences to Postgres.
#[derive(Parser, Debug)]
#[command(name = "anomaly-sync", version, about)]
struct Cli {
    /// Derived feature to compute (anomaly_likehood or anomaly_likehood_log).
    #[arg(long, env = "LIKELIHOOD_FEATURE")]
    feature: String,

    /// First day of the requested range (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,

    /// Last day of the requested range, inclusive (YYYY-MM-DD).
    #[arg(long)]
    end: NaiveDate,

    /// Employee login to process; repeat for several.
    #[arg(long = "employee", required = true)]
    employees: Vec<String>,

    /// Recipe YAML path (overrides LIKELIHOOD_RECIPES).
    #[arg(long)]
    recipes: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    load_dotenv();
    let config = Config::from_env()?;
    config.log_summary();

    let recipes_path = cli.recipes.unwrap_or_else(|| config.engine.recipes_path.clone());
    let recipes = RecipeConfig::from_path(&recipes_path)?.compile()?;
    info!(path = %recipes_path.display(), "loaded recipes");

    let pool = init_pg_pool(&config.postgres).await?;
    let store = Arc::new(PgFeatureStore::new(pool));

    let lookup_start = if config.engine.full_history { None } else { Some(cli.start) };
    let activities = store
        .load_activities(&cli.employees, lookup_start, cli.end)
        .await?;

    let engine = AnomalyFeature::new(recipes, config.engine.clone(), store.clone(), store);

    let outcome = engine
        .sync(&cli.feature, cli.start, cli.end, &cli.employees, &activities)
        .await?;

    match &outcome {
        SyncOutcome::Unsupported { feature } => {
            warn!(%feature, supported = ?engine.supported_features(), "feature not handled by anomaly-sync");
        }
        SyncOutcome::Synced(report) if !report.is_clean() => {
            warn!(failed = report.failed(), "some feature batches failed to commit");
        }
        SyncOutcome::Synced(_) => {}
    }

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
