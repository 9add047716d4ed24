//! Directory listings
//!
//! Builds the flat (`LIST`/`DIR`) and recursive (`RECDIR`) text listings.
//! Both are returned as fresh values; nothing is accumulated between calls.

use chrono::{DateTime, Local};
use log::warn;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::storage::Sandbox;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_time(time: Option<SystemTime>) -> String {
    match time {
        Some(time) => DateTime::<Local>::from(time).format(TIME_FORMAT).to_string(),
        None => "-".to_string(),
    }
}

fn entry_line(name: &str, metadata: &Metadata) -> String {
    if metadata.is_dir() {
        // Birth time is not available everywhere.
        let created = metadata.created().or_else(|_| metadata.modified()).ok();
        format!("{}\t<DIR>\t{}", format_time(created), name)
    } else {
        format!(
            "{}\t\t{}\t{}",
            format_time(metadata.modified().ok()),
            metadata.len(),
            name
        )
    }
}

/// Lists the entries directly under `dir`, one line each, sorted by name.
pub fn list_directory(dir: &Path) -> Result<Vec<String>, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::NotADirectory(dir.display().to_string()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata() {
            Ok(metadata) => entries.push((name.clone(), entry_line(&name, &metadata))),
            Err(e) => warn!("Skipping {} in listing: {}", entry.path().display(), e),
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries.into_iter().map(|(_, line)| line).collect())
}

/// Depth-first listing of the whole sandbox.
///
/// The first line is the root folder's name; every entry below it is
/// `<depth>:<name>` with depth 0 for the root's direct children.
pub fn list_recursive(sandbox: &Sandbox) -> Vec<String> {
    let mut lines = vec![sandbox.name()];

    for entry in WalkDir::new(sandbox.root())
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => lines.push(format!(
                "{}:{}",
                entry.depth() - 1,
                entry.file_name().to_string_lossy()
            )),
            Err(e) => warn!("Skipping entry in recursive listing: {}", e),
        }
    }

    lines
}
