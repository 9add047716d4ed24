//! Error handlers
//!
//! Converts layer errors into control-channel response text.

use log::warn;
use std::net::SocketAddr;

use crate::error::types::FtpServerError;

/// Logs a command failure for a client and returns the text sent back.
pub fn failure_response(client_addr: &SocketAddr, context: &str, err: &FtpServerError) -> String {
    warn!("{} failed for client {}: {}", context, client_addr, err);
    match err {
        FtpServerError::Sandbox(e) => e.to_string(),
        FtpServerError::Storage(e) => e.to_string(),
        FtpServerError::Transfer(e) => e.to_string(),
        FtpServerError::Config(e) => e.to_string(),
        FtpServerError::Io(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;

    #[test]
    fn strips_layer_prefix_for_client() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let msg = failure_response(&addr, "CWD", &SandboxError::NotFound.into());
        assert_eq!(msg, "No such file or directory.");
    }
}
