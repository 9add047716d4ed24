//! Navigation operations implementation

use std::path::{Path, PathBuf};

use crate::error::{FtpServerError, StorageError};
use crate::storage::Sandbox;

/// Resolves the new working directory for a session.
///
/// Nothing is changed here; the caller applies the returned path only on
/// success, so a failed `CWD` leaves the session untouched.
pub fn change_directory(
    sandbox: &Sandbox,
    current_dir: &Path,
    target_path: &str,
) -> Result<PathBuf, FtpServerError> {
    let resolved = sandbox.validate_with_rectify(current_dir, target_path)?;

    if !resolved.is_dir() {
        return Err(StorageError::NotADirectory(target_path.trim().to_string()).into());
    }

    Ok(resolved)
}
