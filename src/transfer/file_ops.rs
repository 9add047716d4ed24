//! Module `file_ops`
//!
//! File and folder transfers over the framed data channel.
//!
//! Folders travel as a manifest frame (file names separated by NUL or
//! newline) followed by one frame per listed file, in manifest order.

use log::{error, info, warn};
use std::io::{self, Write};
use std::path::Path;
use tempfile::{Builder, NamedTempFile, TempDir};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task;

use crate::error::{FtpServerError, StorageError, TransferError};
use crate::storage::Sandbox;
use crate::transfer::framing::{recv_frame, send_frame};

/// Summary of a folder sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSummary {
    pub sent: usize,
    pub failed: Vec<String>,
}

/// Splits a manifest into its non-empty file names.
pub fn parse_manifest(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split(['\0', '\n'])
        .map(|name| name.trim_end_matches('\r'))
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads a whole file into memory.
pub async fn read_file(path: &Path) -> Result<Vec<u8>, StorageError> {
    fs::read(path).await.map_err(|e| StorageError::io(path, e))
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

/// Writes `bytes` to a uniquely named temporary file next to `target` and
/// persists it over `target`, so readers never observe a partial file.
pub async fn save_file(target: &Path, bytes: Vec<u8>) -> Result<(), StorageError> {
    let path = target.to_path_buf();
    task::spawn_blocking(move || persist_atomically(&path, &bytes))
        .await
        .map_err(|e| StorageError::io(target, io::Error::other(e)))?
}

fn persist_atomically(target: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = parent_dir(target);
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;

    if let Err(e) = temp.write_all(bytes) {
        error!("Failed to write temporary file {}: {}", temp.path().display(), e);
        return Err(StorageError::io(temp.path(), e));
    }

    temp.persist(target).map_err(|e| {
        error!("Failed to persist {}: {}", target.display(), e.error);
        StorageError::io(target, e.error)
    })?;
    Ok(())
}

/// Receives one frame and stores it at `target`. Returns the byte count.
pub async fn receive_file<S>(stream: &mut S, target: &Path, chunk_size: usize) -> Result<usize, FtpServerError>
where
    S: AsyncRead + Unpin,
{
    let bytes = recv_frame(stream, chunk_size).await?;
    let len = bytes.len();
    save_file(target, bytes).await?;
    info!("File upload completed: {} ({} bytes)", target.display(), len);
    Ok(len)
}

/// Sends the file at `path` as a single frame. Returns the byte count.
pub async fn send_file<S>(stream: &mut S, path: &Path, chunk_size: usize) -> Result<usize, FtpServerError>
where
    S: AsyncWrite + Unpin,
{
    let bytes = read_file(path).await?;
    send_frame(stream, &bytes, chunk_size).await?;
    info!(
        "File download completed: {} ({} bytes)",
        path.display(),
        bytes.len()
    );
    Ok(bytes.len())
}

/// Rejects a folder destination occupied by something other than a folder.
pub async fn check_folder_target(folder: &Path) -> Result<(), StorageError> {
    match fs::symlink_metadata(folder).await {
        Ok(meta) if !meta.is_dir() => Err(StorageError::NotADirectory(folder.display().to_string())),
        _ => Ok(()),
    }
}

/// Creates an empty hidden sibling of `folder` to receive into.
fn staging_dir(folder: &Path) -> Result<TempDir, StorageError> {
    let dir = parent_dir(folder);
    Builder::new()
        .prefix(".fupload-")
        .tempdir_in(dir)
        .map_err(|e| StorageError::io(dir, e))
}

/// Swaps a completely received staging folder in place of `folder`.
async fn replace_folder(staging: TempDir, folder: &Path) -> Result<(), StorageError> {
    check_folder_target(folder).await?;
    if fs::symlink_metadata(folder).await.is_ok() {
        fs::remove_dir_all(folder)
            .await
            .map_err(|e| StorageError::io(folder, e))?;
    }
    fs::rename(staging.path(), folder)
        .await
        .map_err(|e| StorageError::io(folder, e))
}

/// Receives a folder next to `folder` and replaces `folder` with it only
/// after every frame has arrived. On failure the existing folder is left
/// untouched and the partial copy is removed.
pub async fn receive_folder_staged<S>(
    stream: &mut S,
    sandbox: &Sandbox,
    folder: &Path,
    chunk_size: usize,
) -> Result<Vec<String>, FtpServerError>
where
    S: AsyncRead + Unpin,
{
    let staging = staging_dir(folder)?;
    let messages = receive_folder(stream, sandbox, staging.path(), chunk_size).await?;
    replace_folder(staging, folder).await?;
    Ok(messages)
}

/// Receives a folder into `folder`, which must already exist.
///
/// Returns one message per manifest entry. A transfer error aborts the
/// remaining entries, since the stream can no longer be trusted.
pub async fn receive_folder<S>(
    stream: &mut S,
    sandbox: &Sandbox,
    folder: &Path,
    chunk_size: usize,
) -> Result<Vec<String>, TransferError>
where
    S: AsyncRead + Unpin,
{
    let manifest = parse_manifest(&recv_frame(stream, chunk_size).await?);
    info!(
        "Receiving folder {} ({} files)",
        folder.display(),
        manifest.len()
    );

    let mut messages = Vec::with_capacity(manifest.len());
    for name in &manifest {
        // Always consume the frame, even for entries that get rejected.
        let bytes = recv_frame(stream, chunk_size).await?;

        let target = match sandbox.upload_target(folder, name) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejected folder entry {}: {}", name, e);
                messages.push(format!("Error saving file {name}: {e}"));
                continue;
            }
        };

        let file_name = display_name(&target);
        match save_file(&target, bytes).await {
            Ok(()) => messages.push(format!("Successfully uploaded and saved file {file_name}")),
            Err(e) => messages.push(format!("Error saving file {file_name}: {e}")),
        }
    }

    Ok(messages)
}

/// Sends the regular files directly inside `folder`: a manifest, then one
/// frame per file. Unreadable files go out as empty frames.
pub async fn send_folder<S>(stream: &mut S, folder: &Path, chunk_size: usize) -> Result<FolderSummary, FtpServerError>
where
    S: AsyncWrite + Unpin,
{
    let names = folder_files(folder).await?;
    let manifest = names.join("\0");
    send_frame(stream, manifest.as_bytes(), chunk_size).await?;

    let mut summary = FolderSummary {
        sent: 0,
        failed: Vec::new(),
    };
    for name in &names {
        let bytes = match read_file(&folder.join(name)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Sending empty frame for unreadable file {}: {}", name, e);
                summary.failed.push(name.clone());
                Vec::new()
            }
        };
        send_frame(stream, &bytes, chunk_size).await?;
        summary.sent += 1;
    }

    info!(
        "Folder download completed: {} ({} files)",
        folder.display(),
        summary.sent
    );
    Ok(summary)
}

/// Names of the regular files directly inside `folder`, sorted.
async fn folder_files(folder: &Path) -> Result<Vec<String>, StorageError> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(folder)
        .await
        .map_err(|e| StorageError::io(folder, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(folder, e))?
    {
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {
                names.push(entry.file_name().to_string_lossy().into_owned())
            }
            _ => {}
        }
    }
    names.sort();
    Ok(names)
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
