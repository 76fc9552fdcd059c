mod config;
pub mod database;

pub use config::{Config, Theme, UiConfig, AVAILABLE_LANGUAGES};
pub use database::{Database, HistoryStats, SessionRecord};

use std::path::PathBuf;

/// Returns the data directory, creating it if needed.
///
/// `BREATHWORK_DATA_DIR` overrides the location entirely. Otherwise this is
/// `~/.config/breathwork[-dev]/`, with `BREATHWORK_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let dir = match std::env::var_os("BREATHWORK_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("BREATHWORK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("breathwork-dev")
            } else {
                base_dir.join("breathwork")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
