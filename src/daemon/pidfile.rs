//! PID file helpers

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Read a pid previously written by [`write_pid`]
#[must_use]
pub fn read_pid(path: &Path) -> Option<u32> {
    let text = fs::read_to_string(path).ok()?;
    text.trim().parse::<u32>().ok()
}

/// Record `pid` at `path`, creating parent directories
///
/// # Errors
/// Returns error if the directory or file cannot be written
pub fn write_pid(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, pid.to_string())?;
    Ok(())
}

/// Remove the pid file if present
///
/// # Errors
/// Returns error if an existing file cannot be removed
pub fn remove_pid(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
