use anyhow::{Context, Result};
use flexi_logger::{FileSpec, Logger, LoggerHandle};

use crate::paths::log_dir_path;

/// Routes `log` records to a file so they never bleed into the TUI.
/// The returned handle must stay alive for the duration of the process.
pub fn init_logging() -> Result<LoggerHandle> {
    let dir = log_dir_path()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    Logger::try_with_env_or_str("info")
        .context("invalid log specification")?
        .log_to_file(
            FileSpec::default()
                .directory(&dir)
                .basename("lingocast")
                .suppress_timestamp(),
        )
        .append()
        .start()
        .context("failed to start logger")
}
