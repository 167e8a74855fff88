use std::fs;
use std::path::{Path, PathBuf};

const CACHE_DIR: &str = "cache";
const CACHE_DB_FILE: &str = "artifacts.db";

pub fn ensure_data_dir(data_dir: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(data_dir)?;
    Ok(data_dir.to_path_buf())
}

/// Root of the file-backed artifact cache.
pub fn cache_root(data_dir: &Path) -> PathBuf {
    data_dir.join(CACHE_DIR)
}

pub fn cache_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CACHE_DB_FILE)
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
