use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use staysim_core::{EngineConfig, ListingId, SimilarityEngine, SimilarityParams};
use staysim_storage::{export_neighbors, import_jsonl_file, LmdbListingStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Similar-listing recommendations for rental catalogs
#[derive(Parser, Debug)]
#[command(name = "staysim")]
#[command(about = "Precompute and query similar listings", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG when set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load cleaned listings from a JSON-lines file
    Import {
        path: PathBuf,
    },
    /// Compute and store neighbor lists for every listing
    Precompute(ParamArgs),
    /// Print the listings similar to one listing
    Similar {
        id: ListingId,

        /// Compute now instead of reading the stored list
        #[arg(long)]
        online: bool,

        #[command(flatten)]
        params: ParamArgs,
    },
    /// Write all stored neighbor lists to a JSON file
    Export {
        path: PathBuf,
    },
}

/// Overrides for the configured similarity parameters
#[derive(ClapArgs, Debug)]
struct ParamArgs {
    #[arg(long)]
    top_n: Option<usize>,

    #[arg(long)]
    max_log_price_diff: Option<f64>,

    #[arg(long)]
    min_similarity: Option<f32>,

    #[arg(long)]
    min_distance_miles: Option<f64>,
}

impl ParamArgs {
    fn apply(&self, mut params: SimilarityParams) -> SimilarityParams {
        if let Some(top_n) = self.top_n {
            params.top_n = top_n;
        }
        if let Some(diff) = self.max_log_price_diff {
            params.max_log_price_diff = diff;
        }
        if let Some(min) = self.min_similarity {
            params.min_similarity = min;
        }
        if let Some(miles) = self.min_distance_miles {
            params.min_distance_miles = miles;
        }
        params
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("staysim v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let store = Arc::new(LmdbListingStore::open(&args.data_dir)?);

    match args.command {
        Command::Import { path } => {
            let report = import_jsonl_file(store.as_ref(), &path, config.write_batch_size)?;
            println!("{}", serde_json::to_string(&serde_json::json!({
                "imported": report.imported,
                "rejected": report.rejected,
            }))?);
        }
        Command::Precompute(overrides) => {
            let params = overrides.apply(config.params);
            let engine = SimilarityEngine::new(store, config)?;
            let result = engine.precompute_all(&params)?;
            println!("{}", serde_json::to_string(&serde_json::json!({
                "processed_count": result.processed_count,
                "failures": result
                    .failures
                    .iter()
                    .map(|f| serde_json::json!({ "id": f.id, "error": f.error.to_string() }))
                    .collect::<Vec<_>>(),
            }))?);
        }
        Command::Similar { id, online, params: overrides } => {
            let params = overrides.apply(config.params);
            let engine = SimilarityEngine::new(store, config)?;
            let similar = if online {
                engine.find_similar_with(id, &params)?
            } else {
                let mut stored = engine.precomputed_similar(id)?;
                stored.truncate(params.top_n);
                stored
            };
            println!("{}", serde_json::to_string(&similar)?);
        }
        Command::Export { path } => {
            let count = export_neighbors(store.as_ref(), &path)?;
            info!("Wrote {} neighbor lists", count);
        }
    }

    Ok(())
}
