//! Inspect or invalidate the persisted global model cache.
//!
//! Usage: model-cache-inspect [--config <file>] [--path <cache file>] [--invalidate]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use model_cache::persistence::read_header;
use model_cache::{CacheConfig, CacheHeader, FileSnapshotStorage, SnapshotStorage};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "model-cache-inspect",
    version,
    about = "Inspect or invalidate a persisted global model cache"
)]
struct Cli {
    /// JSON config file; defaults apply when omitted or missing.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cache file to inspect, overriding the configured location.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Remove the cache file instead of describing it.
    #[arg(long)]
    invalidate: bool,
}

#[derive(Debug, Serialize)]
struct HeaderReport {
    format_version: u32,
    model_version: u32,
    generation: u64,
    saved_at: u64,
    saved_at_rfc3339: Option<String>,
}

impl From<CacheHeader> for HeaderReport {
    fn from(header: CacheHeader) -> Self {
        let saved_at_rfc3339 = i64::try_from(header.saved_at)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|time| time.to_rfc3339());
        Self {
            format_version: header.format_version,
            model_version: header.model_version,
            generation: header.generation,
            saved_at: header.saved_at,
            saved_at_rfc3339,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Report {
    Present {
        present: bool,
        path: PathBuf,
        size_bytes: usize,
        header: HeaderReport,
    },
    Absent {
        present: bool,
        path: PathBuf,
    },
    Invalidated {
        path: PathBuf,
        removed: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("failed to render report: {error}");
                ExitCode::FAILURE
            }
        },
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Report, String> {
    let storage = FileSnapshotStorage::new(resolve_path(cli)?);
    let path = storage.path().to_path_buf();
    log::debug!("inspecting model cache at {}", path.display());

    if cli.invalidate {
        let removed = storage.remove().map_err(|error| error.to_string())?;
        return Ok(Report::Invalidated { path, removed });
    }

    let Some(bytes) = storage.read().map_err(|error| error.to_string())? else {
        return Ok(Report::Absent {
            present: false,
            path,
        });
    };
    let header = read_header(&bytes)
        .map_err(|error| format!("unreadable model cache at {}: {error}", path.display()))?;
    Ok(Report::Present {
        present: true,
        path,
        size_bytes: bytes.len(),
        header: header.into(),
    })
}

fn resolve_path(cli: &Cli) -> Result<PathBuf, String> {
    if let Some(path) = &cli.path {
        return Ok(path.clone());
    }
    let config = match &cli.config {
        Some(file) => load_config(file)?,
        None => CacheConfig::default(),
    };
    config
        .with_env_overrides()
        .cache_path()
        .map_err(|error| error.to_string())
}

fn load_config(file: &Path) -> Result<CacheConfig, String> {
    CacheConfig::load(file).map_err(|error| error.to_string())
}
