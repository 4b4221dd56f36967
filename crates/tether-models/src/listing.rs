//! Listing of the files in the backends directory.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;

/// Timestamp format used in listings (`2024/11/02 17:05:09`).
pub const LISTING_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// One file in the backends directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendListing {
    /// File name, extension included.
    pub file_name: String,
    /// Creation time in local time, formatted with [`LISTING_TIME_FORMAT`].
    pub created: String,
}

impl BackendListing {
    /// Returns the `(file_name, created)` pair.
    #[must_use]
    pub fn into_pair(self) -> (String, String) {
        (self.file_name, self.created)
    }
}

/// Formats a filesystem timestamp for listings.
#[must_use]
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(LISTING_TIME_FORMAT).to_string()
}

/// Lists the regular files in `dir` with their creation times, sorted by
/// file name.
///
/// Platforms without a creation time report the modification time. A missing
/// directory lists as empty.
///
/// # Errors
/// Returns an I/O error if the directory exists but cannot be read.
pub fn list_backends(dir: &Path) -> std::io::Result<Vec<BackendListing>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut listings = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let created = metadata.created().or_else(|_| metadata.modified())?;
        listings.push(BackendListing {
            file_name: entry.file_name().to_string_lossy().into_owned(),
            created: format_timestamp(created),
        });
    }

    listings.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(listings)
}
