use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::ConfigManager;
use crate::VerbosityLevel;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize the logging system
///
/// Console output defaults to `info`. `--verbose` raises it to `debug`,
/// `--quiet` lowers it to `error`, and `RUST_LOG` overrides both:
///
/// ```bash
/// RUST_LOG=debug workshop-archive -e .cpp,.h
/// RUST_LOG=off workshop-archive --stats
/// ```
///
/// A timestamped record of each run is also appended to `workshop-archive.log`
/// in the config directory; see [`log_to_file`].
pub fn init_logger(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => LevelFilter::Error,
        VerbosityLevel::Normal => LevelFilter::Info,
        VerbosityLevel::Verbose => LevelFilter::Debug,
    };

    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(default_level);

    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // Ignore error if logger is already initialized
}

/// Append a line to the log file in the config directory.
///
/// Failures are reported at debug level and otherwise ignored, so a read-only
/// config directory never breaks an archive run.
pub fn log_to_file(message: &str) {
    let result = ConfigManager::ensure_config_dir()
        .and_then(|_| ConfigManager::log_file_path())
        .and_then(|path| append_line(&path, message));

    if let Err(e) = result {
        log::debug!("Could not write to log file: {e:#}");
    }
}

fn append_line(log_path: &Path, message: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rotate the log file if it exceeds 10MB
pub fn rotate_log_if_needed() -> Result<()> {
    rotate_if_larger(&ConfigManager::log_file_path()?, MAX_LOG_SIZE)
}

fn rotate_if_larger(log_path: &Path, max_size: u64) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(log_path)?;
    if metadata.len() <= max_size {
        return Ok(());
    }

    let old_log_path = log_path.with_extension("log.old");
    if old_log_path.exists() {
        std::fs::remove_file(&old_log_path)?;
    }
    std::fs::rename(log_path, &old_log_path)?;

    log::info!("Log file rotated to {}", old_log_path.display());
    Ok(())
}
