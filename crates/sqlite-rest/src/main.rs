mod cli;
mod config;
mod core;
mod error;
mod http;
mod logging;

use std::path::Path;

use clap::Parser;

use crate::cli::Args;
use crate::config::Config;
use crate::error::{AppError, AppResult};

fn main() -> AppResult<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let config = Config::from_env(&args);
    ensure_db_file(&config.db_path)?;
    tracing::info!("Using database in {}", config.db_path.display());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    rt.block_on(http::serve(config))
}

/// Creates the database file (and its parent directory) when missing. Any
/// failure here is fatal; the server never starts without a usable file.
fn ensure_db_file(path: &Path) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
    }
    if !path.exists() {
        tracing::info!("Database not found. Creating new one in {}", path.display());
        std::fs::File::create(path)?;
    }
    Ok(())
}
