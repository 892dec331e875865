//! Atomic file replacement for small state files.

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

/// Write a file atomically: write to a sibling temp file, sync, then
/// rename into place. Readers observe either the old contents or the new,
/// never a torn write. Credential state goes through this path so a crash
/// mid-save cannot leave an unreadable vault.
///
/// # Errors
///
/// Returns an error if the temp file cannot be written or the rename
/// fails. The temp file is removed on a failed rename.
pub fn write_atomic(destination: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = destination.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    replace_file(&temp_path, destination)
}

/// Rename over the destination, tolerating platforms (notably Windows)
/// where `fs::rename` refuses to replace an existing file.
fn replace_file(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}
