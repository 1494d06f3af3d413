pub mod worker;

mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use anl_service::AnlService;
use anl_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = anl_cli::VERSION,
	rename_all = "kebab",
	styles = anl_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = anl_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.qdrant.vector_dim).await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	// Vectorization failures are retried through the outbox, so a missing collection is not fatal.
	if let Err(err) = qdrant.ensure_collection().await {
		tracing::warn!(error = %err, "Qdrant collection check failed; continuing without it.");
	}

	let state = worker::WorkerState::new(AnlService::new(config, db, qdrant));

	worker::run_worker(state).await
}
