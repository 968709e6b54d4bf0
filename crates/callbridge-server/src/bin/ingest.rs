//! Ingests a text document into the knowledge collection.

use callbridge_server::config;
use callbridge_server::ingest::{ingest_file, IngestArgs};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let args = match IngestArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let config_path = args
        .config_path
        .clone()
        .or_else(|| std::env::var("CALLBRIDGE_CONFIG_PATH").ok())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "config.toml".to_string());
    let mut config = config::load_config(Some(&config_path))?;
    args.apply(&mut config.knowledge);

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        url = %config.knowledge.qdrant_url,
        collection = %config.knowledge.collection,
        "ingesting {}",
        args.path.display()
    );

    match ingest_file(&config.knowledge, &args.path, args.source_id.as_deref()).await {
        Ok(count) => {
            tracing::info!(chunks = count, "ingest complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!("ingest failed: {}", e);
            Err(e.into())
        }
    }
}
