//! Command handlers module for the RAX share server.
//!
//! Each handler validates its arguments against the sandbox before touching
//! the filesystem or waiting on the data channel, and turns every failure
//! into response text. Only `CWD` and `RSTDIR` change the session's working
//! directory, and only on success.

use log::info;
use std::path::Path;

use crate::client::Session;
use crate::config::ServerConfig;
use crate::error::handlers::failure_response;
use crate::error::{FtpServerError, StorageError};
use crate::navigate::change_directory;
use crate::protocol::responses::{COMMAND_NOT_FOUND, directory_changed};
use crate::protocol::{Command, CommandResult};
use crate::storage::{Sandbox, list_directory, list_recursive};
use crate::transfer::DataStream;
use crate::transfer::file_ops::{check_folder_target, display_name};
use crate::transfer::{receive_file, receive_folder_staged, send_file, send_folder};

/// Dispatches a received command to its corresponding handler.
///
/// # Arguments
///
/// * `session` - Mutable reference to the session sending the command.
/// * `command` - Reference to the parsed command enum.
/// * `sandbox` - The sandbox every path is confined to.
/// * `config` - Server configuration (chunk size, data channel timeout).
///
/// # Returns
///
/// * `CommandResult` - Result of the command execution, including status and message.
pub async fn handle_command(
    session: &mut Session,
    command: &Command,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> CommandResult {
    match command {
        Command::CWD(path) => handle_cmd_cwd(session, path, sandbox),
        Command::RSTDIR => handle_cmd_rstdir(session, sandbox),
        Command::PWD => handle_cmd_pwd(session),
        Command::LIST(path) => handle_cmd_list(session, path.as_deref(), sandbox),
        Command::RETR(filename) => handle_cmd_retr(session, filename, sandbox, config).await,
        Command::UPLOAD(path) => handle_cmd_upload(session, path, sandbox, config).await,
        Command::FUPLOAD(path) => handle_cmd_fupload(session, path, sandbox, config).await,
        Command::FRETR(path) => handle_cmd_fretr(session, path, sandbox, config).await,
        Command::RECDIR => handle_cmd_recdir(sandbox),
        Command::UNKNOWN => handle_cmd_unknown(),
    }
}

fn fail(session: &Session, context: &str, err: impl Into<FtpServerError>) -> CommandResult {
    CommandResult::failure(failure_response(session.client_addr(), context, &err.into()))
}

/// Waits for the session's data connection.
async fn acquire_data(session: &Session, config: &ServerConfig) -> Result<DataStream, FtpServerError> {
    Ok(session
        .data_channel()
        .acquire(config.data_connection_timeout())
        .await?)
}

/// A transfer error leaves the stream in an unknown position; drop it.
async fn settle<T>(data: DataStream, result: &Result<T, FtpServerError>) {
    if let Err(FtpServerError::Transfer(_)) = result {
        data.discard().await;
    }
}

/// Handles the CWD command: validates the target and moves the session there.
fn handle_cmd_cwd(session: &mut Session, path: &str, sandbox: &Sandbox) -> CommandResult {
    match change_directory(sandbox, session.current_dir(), path) {
        Ok(new_dir) => {
            let message = directory_changed(&new_dir);
            session.set_current_dir(new_dir);
            CommandResult::success(message)
        }
        Err(e) => fail(session, "CWD", e),
    }
}

/// Handles the RSTDIR command: returns the session to the sandbox root.
fn handle_cmd_rstdir(session: &mut Session, sandbox: &Sandbox) -> CommandResult {
    session.set_current_dir(sandbox.root().to_path_buf());
    CommandResult::success(directory_changed(sandbox.root()))
}

fn handle_cmd_pwd(session: &Session) -> CommandResult {
    CommandResult::success(session.current_dir().display().to_string())
}

/// Handles the LIST/DIR command: flat listing of the working directory or
/// of the given path.
fn handle_cmd_list(session: &Session, path: Option<&str>, sandbox: &Sandbox) -> CommandResult {
    let dir = match path {
        None => session.current_dir().to_path_buf(),
        Some(raw) => match sandbox.validate_with_rectify(session.current_dir(), raw) {
            Ok(dir) => dir,
            Err(e) => return fail(session, "LIST", e),
        },
    };

    match list_directory(&dir) {
        Ok(lines) => {
            info!(
                "Client {} listed directory {} - {} entries",
                session.client_addr(),
                dir.display(),
                lines.len()
            );
            CommandResult::success(lines.join("\n"))
        }
        Err(e) => fail(session, "LIST", e),
    }
}

/// Handles the RECDIR command: recursive listing of the whole sandbox.
fn handle_cmd_recdir(sandbox: &Sandbox) -> CommandResult {
    CommandResult::success(list_recursive(sandbox).join("\n"))
}

/// Handles the RETR command: sends a file to the client as one frame.
async fn handle_cmd_retr(
    session: &Session,
    filename: &str,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> CommandResult {
    // 1. Resolve and validate before any waiting
    let path = match sandbox.validate_with_rectify(session.current_dir(), filename) {
        Ok(path) => path,
        Err(e) => return fail(session, "RETR", e),
    };

    // 2. Only regular files can be retrieved
    if !path.is_file() {
        return fail(session, "RETR", StorageError::NotAFile(filename.trim().to_string()));
    }

    info!(
        "Client {} requested to retrieve {} ({})",
        session.client_addr(),
        filename,
        path.display()
    );

    // 3. Wait for the data connection
    let mut data = match acquire_data(session, config).await {
        Ok(data) => data,
        Err(e) => return fail(session, "RETR", e),
    };

    // 4. Send the file
    let result = match data.get_mut() {
        Ok(stream) => send_file(stream, &path, config.chunk_size).await,
        Err(e) => Err(e.into()),
    };
    settle(data, &result).await;

    match result {
        Ok(_) => CommandResult::success(format!("Successfully retrieved file {}", filename.trim())),
        Err(e) => {
            let reason = failure_response(session.client_addr(), "RETR", &e);
            CommandResult::failure(format!("Error retrieving file {}: {}", filename.trim(), reason))
        }
    }
}

/// Handles the UPLOAD command: receives one frame and saves it under the
/// working directory, keeping only the name component of the argument.
async fn handle_cmd_upload(
    session: &Session,
    path: &str,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> CommandResult {
    let target = match sandbox.upload_target(session.current_dir(), path) {
        Ok(target) => target,
        Err(e) => return fail(session, "UPLOAD", e),
    };
    let name = display_name(&target);

    if target.is_dir() {
        return fail(session, "UPLOAD", StorageError::NotAFile(name));
    }

    info!(
        "Client {} requested to upload {} ({})",
        session.client_addr(),
        name,
        target.display()
    );

    let mut data = match acquire_data(session, config).await {
        Ok(data) => data,
        Err(e) => return fail(session, "UPLOAD", e),
    };

    let result = match data.get_mut() {
        Ok(stream) => receive_file(stream, &target, config.chunk_size).await,
        Err(e) => Err(e.into()),
    };
    settle(data, &result).await;

    match result {
        Ok(_) => CommandResult::success(format!("Successfully uploaded and saved file {name}")),
        Err(e) => {
            let reason = failure_response(session.client_addr(), "UPLOAD", &e);
            CommandResult::failure(format!("Error saving file {name}\n{reason}"))
        }
    }
}

/// Handles the FUPLOAD command: receives a manifest and its files into a
/// folder under the working directory. An existing folder of that name is
/// replaced only once the whole folder has arrived.
async fn handle_cmd_fupload(
    session: &Session,
    path: &str,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> CommandResult {
    let folder = match sandbox.upload_target(session.current_dir(), path) {
        Ok(folder) => folder,
        Err(e) => return fail(session, "FUPLOAD", e),
    };
    let name = display_name(&folder);

    if let Err(e) = check_folder_target(&folder).await {
        return fail(session, "FUPLOAD", e);
    }

    info!(
        "Client {} requested to upload folder {} ({})",
        session.client_addr(),
        name,
        folder.display()
    );

    let mut data = match acquire_data(session, config).await {
        Ok(data) => data,
        Err(e) => return fail(session, "FUPLOAD", e),
    };

    let result = match data.get_mut() {
        Ok(stream) => receive_folder_staged(stream, sandbox, &folder, config.chunk_size).await,
        Err(e) => Err(e.into()),
    };
    settle(data, &result).await;

    match result {
        Ok(messages) if messages.is_empty() => {
            CommandResult::success(format!("Successfully received and saved folder {name}"))
        }
        Ok(messages) => {
            let all_saved = messages.iter().all(|m| m.starts_with("Successfully"));
            let body = messages.join("\n");
            if all_saved {
                CommandResult::success(body)
            } else {
                CommandResult::failure(body)
            }
        }
        Err(e) => {
            let reason = failure_response(session.client_addr(), "FUPLOAD", &e);
            CommandResult::failure(format!("Failed to receive folder {name}\n{reason}"))
        }
    }
}

/// Handles the FRETR command: sends the files of a folder as a manifest
/// followed by one frame per file.
async fn handle_cmd_fretr(
    session: &Session,
    path: &str,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> CommandResult {
    let folder = match sandbox.validate_with_rectify(session.current_dir(), path) {
        Ok(folder) => folder,
        Err(e) => return fail(session, "FRETR", e),
    };

    if !folder.is_dir() {
        return fail(session, "FRETR", StorageError::NotADirectory(path.trim().to_string()));
    }
    let name = folder_name(&folder, sandbox);

    let mut data = match acquire_data(session, config).await {
        Ok(data) => data,
        Err(e) => return fail(session, "FRETR", e),
    };

    let result = match data.get_mut() {
        Ok(stream) => send_folder(stream, &folder, config.chunk_size).await,
        Err(e) => Err(e.into()),
    };
    settle(data, &result).await;

    match result {
        Ok(summary) => {
            let mut body = format!(
                "Successfully retrieved folder {name} ({} files)",
                summary.sent
            );
            for failed in &summary.failed {
                body.push_str(&format!("\nError retrieving file {failed}"));
            }
            CommandResult::success(body)
        }
        Err(e) => {
            let reason = failure_response(session.client_addr(), "FRETR", &e);
            CommandResult::failure(format!("Error retrieving folder {name}: {reason}"))
        }
    }
}

fn folder_name(folder: &Path, sandbox: &Sandbox) -> String {
    if folder == sandbox.root() {
        sandbox.name()
    } else {
        display_name(folder)
    }
}

fn handle_cmd_unknown() -> CommandResult {
    CommandResult::failure(COMMAND_NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandStatus;
    use crate::transfer::DataChannel;
    use std::fs;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        sandbox: Sandbox,
        session: Session,
        config: ServerConfig,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let sandbox = Sandbox::open(&tmp.path().join("ToShare")).unwrap();
        fs::write(sandbox.root().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(sandbox.root().join("sub")).unwrap();
        let channel = Arc::new(DataChannel::new("127.0.0.1:0".parse().unwrap()));
        let session = Session::new("127.0.0.1:40000".parse().unwrap(), sandbox.root(), channel);
        let config = ServerConfig {
            data_connection_timeout_secs: 1,
            ..ServerConfig::default()
        };
        Fixture {
            _tmp: tmp,
            sandbox,
            session,
            config,
        }
    }

    async fn run(f: &mut Fixture, line: &str) -> CommandResult {
        let command = crate::protocol::parse_command(line);
        handle_command(&mut f.session, &command, &f.sandbox, &f.config).await
    }

    #[tokio::test]
    async fn cwd_success_and_pwd() {
        let mut f = fixture();
        let result = run(&mut f, "CWD sub").await;
        let sub = f.sandbox.root().join("sub");
        assert_eq!(
            result.message,
            format!("Directory successfully changed to {}", sub.display())
        );
        assert_eq!(run(&mut f, "PWD").await.message, sub.display().to_string());
    }

    #[tokio::test]
    async fn failed_cwd_leaves_directory_unchanged() {
        let mut f = fixture();
        let before = f.session.current_dir().to_path_buf();
        let result = run(&mut f, "CWD nope").await;
        assert_eq!(result.message, "No such file or directory.");
        assert_eq!(f.session.current_dir(), before);

        let result = run(&mut f, "CWD ..").await;
        assert_eq!(result.message, "Path outside sharing folder, aborted.");
        assert_eq!(f.session.current_dir(), before);

        assert_eq!(run(&mut f, "CWD").await.message, "No path given.");
    }

    #[tokio::test]
    async fn rstdir_returns_to_root() {
        let mut f = fixture();
        run(&mut f, "CWD sub").await;
        let result = run(&mut f, "RSTDIR").await;
        assert!(result.is_success());
        assert_eq!(f.session.current_dir(), f.sandbox.root());
    }

    #[tokio::test]
    async fn list_defaults_to_working_directory() {
        let mut f = fixture();
        let result = run(&mut f, "LIST").await;
        let lines: Vec<&str> = result.message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.ends_with("\t\t10\ta.txt")));
        assert!(lines.iter().any(|l| l.ends_with("\t<DIR>\tsub")));
    }

    #[tokio::test]
    async fn list_validates_argument() {
        let mut f = fixture();
        assert_eq!(
            run(&mut f, "DIR ../..").await.message,
            "Path outside sharing folder, aborted."
        );
    }

    #[tokio::test]
    async fn retr_missing_file_fails_before_waiting() {
        let mut f = fixture();
        let started = Instant::now();
        let result = run(&mut f, "RETR missing.txt").await;
        assert_eq!(result.message, "No such file or directory.");
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn upload_without_data_connection_times_out() {
        let mut f = fixture();
        let result = run(&mut f, "UPLOAD foo.bin").await;
        assert_eq!(
            result.status,
            CommandStatus::Failure("No data connection arrived within 1 seconds".into())
        );
        assert!(!f.sandbox.root().join("foo.bin").exists());
    }

    #[tokio::test]
    async fn timed_out_folder_upload_keeps_existing_folder() {
        let mut f = fixture();
        let keep = f.sandbox.root().join("sub/keep.txt");
        fs::write(&keep, b"keep").unwrap();

        let result = run(&mut f, "FUPLOAD sub").await;

        assert_eq!(result.message, "No data connection arrived within 1 seconds");
        assert_eq!(fs::read(&keep).unwrap(), b"keep");
        assert_eq!(run(&mut f, "RECDIR").await.message, "ToShare\n0:a.txt\n0:sub\n1:keep.txt");
    }

    #[tokio::test]
    async fn folder_upload_onto_a_file_fails_before_waiting() {
        let mut f = fixture();
        let started = Instant::now();
        let result = run(&mut f, "FUPLOAD a.txt").await;
        assert!(!result.is_success());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(fs::read(f.sandbox.root().join("a.txt")).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn recdir_is_idempotent() {
        let mut f = fixture();
        let first = run(&mut f, "RECDIR").await.message;
        let second = run(&mut f, "RECDIR").await.message;
        assert_eq!(first, second);
        assert_eq!(first, "ToShare\n0:a.txt\n0:sub");
    }

    #[tokio::test]
    async fn unknown_command() {
        let mut f = fixture();
        assert_eq!(run(&mut f, "NOPE").await.message, "Command not found.");
    }
}
