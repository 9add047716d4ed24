//! Module `command`
//!
//! Defines the command parsing logic and the data structures used to
//! represent commands and their results.

/// Represents a command parsed from the client input.
///
/// Commands taking a path keep the raw (possibly empty) argument; a missing
/// argument is reported by path validation, not by the parser.
#[derive(Debug, PartialEq)]
pub enum Command {
    CWD(String),         // Change working directory
    RSTDIR,              // Reset working directory to the sandbox root
    PWD,                 // Print working directory
    LIST(Option<String>), // Flat listing (alias DIR)
    RETR(String),        // Send a file over the data channel (alias GET)
    UPLOAD(String),      // Receive a file over the data channel
    FUPLOAD(String),     // Receive a folder over the data channel
    FRETR(String),       // Send a folder over the data channel (alias FGET)
    RECDIR,              // Recursive listing of the whole sandbox
    UNKNOWN,             // Unknown or unsupported command
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
}

/// Struct encapsulating the full result of a command execution.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: String,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: message.into(),
        }
    }

    /// A failure whose client-facing text doubles as the status reason.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: CommandStatus::Failure(message.clone()),
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Parses a raw command line into the `Command` enum.
///
/// The command word is case-insensitive and separated from its argument by
/// the first whitespace.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "CWD" => Command::CWD(arg.to_string()),
        "RSTDIR" => Command::RSTDIR,
        "PWD" => Command::PWD,
        "DIR" | "LIST" if arg.is_empty() => Command::LIST(None),
        "DIR" | "LIST" => Command::LIST(Some(arg.to_string())),
        "RETR" | "GET" => Command::RETR(arg.to_string()),
        "UPLOAD" => Command::UPLOAD(arg.to_string()),
        "FUPLOAD" => Command::FUPLOAD(arg.to_string()),
        "FRETR" | "FGET" => Command::FRETR(arg.to_string()),
        "RECDIR" => Command::RECDIR,
        _ => Command::UNKNOWN,
    }
}
