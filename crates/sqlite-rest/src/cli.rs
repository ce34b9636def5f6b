use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "sqlite-rest", version)]
pub struct Args {
    /// Path to the sqlite database file. Created (with its parent
    /// directory) when missing.
    #[arg(short = 'f', long, default_value = "./data/data.sqlite")]
    pub db_path: PathBuf,

    /// Port to listen on.
    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
