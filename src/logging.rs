//! Log output setup
//!
//! Runs log to a file (`logs/validation.log` unless configured otherwise).
//! If the file cannot be opened, logs go to stderr instead.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

/// Installs the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(log_file: &Path, verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let file = crate::utils::ensure_parent_dir(log_file).and_then(|()| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
    });

    match file {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_max_level(level)
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .try_init();
            tracing::warn!("Cannot open log file {}: {e}", log_file.display());
        }
    }
}
