use std::path::Path;

use anyhow::Result;
use log::{error, info};
use tokio::fs;

/// Asynchronously ensures that a directory exists, creating it if it does
/// not. Idempotent.
pub async fn ensure_directory_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        if let Err(err) = fs::create_dir_all(path).await {
            error!("Failed to create directory at {:?}: {}", path, err);
            return Err(err.into());
        }
        info!("Created directory at {:?}", path);
    }
    Ok(())
}
