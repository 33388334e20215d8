use clap::Parser;
use dotenvy::dotenv;
use rust_upload_queue::config::UploadConfig;
use rust_upload_queue::infrastructure::remote;
use rust_upload_queue::services::engine::UploadEngine;
use rust_upload_queue::services::events::LoggingListener;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Staging directory to recover and upload from
    #[arg(short, long)]
    staging_root: Option<PathBuf>,

    /// Exit once every recovered upload has been transferred
    #[arg(long)]
    drain: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_upload_queue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = UploadConfig::from_env();
    if let Some(root) = args.staging_root {
        config.staging_root = root;
    }

    info!(
        "🚀 Starting upload queue [Root: {}, Concurrency: {}]",
        config.staging_root.display(),
        config.concurrent_uploads
    );

    let store = remote::setup_remote().await;
    let engine = UploadEngine::new(config.clone(), store, Arc::new(LoggingListener));

    let resumed = engine.recover(&config.staging_root).await?;
    info!("🔁 Recovered {} pending upload(s)", resumed);

    engine.start().await;

    if args.drain {
        engine.drain().await;
        info!("✅ Staging queue drained");
    } else {
        signal::ctrl_c().await?;
        info!("🛑 Shutdown signal received");
    }

    engine.stop().await;
    Ok(())
}
