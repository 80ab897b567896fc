use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Platform data directory for snipvault (`~/.local/share/snipvault/` on
/// Linux). The directory is not created here; see
/// [`crate::server::resolve_data_dir`].
pub fn platform_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "snipvault")
        .context("could not determine platform data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
