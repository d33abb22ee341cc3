use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RecError, RecResult};

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces `path` with `bytes` so that readers see either the old file or the
/// new one, never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> RecResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| RecError::io(parent, e))?;
    }
    let temp_path = temp_path_for(path);

    let mut file = fs::File::create(&temp_path).map_err(|e| RecError::io(&temp_path, e))?;
    file.write_all(bytes).map_err(|e| RecError::io(&temp_path, e))?;
    file.sync_all().map_err(|e| RecError::io(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| RecError::io(&temp_path, e))?;
    debug!(path = ?path, bytes = bytes.len(), "Atomically replaced file");
    Ok(())
}

/// Removes `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> RecResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RecError::io(path, e)),
    }
}
