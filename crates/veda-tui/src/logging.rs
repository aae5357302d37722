use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "veda=info";

/// `$VEDA_LOG`, or a file in the temp dir. The terminal belongs to the UI.
pub fn log_path() -> PathBuf {
    env::var("VEDA_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("veda_tui.log"))
}

pub fn init() -> Result<PathBuf> {
    let path = log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {}", e))?;

    Ok(path)
}
