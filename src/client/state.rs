//! Module `client`
//!
//! Defines the `Session` struct holding the server-side state of one control
//! connection: the client's address, its working directory, and its data
//! channel.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::transfer::DataChannel;

/// Represents the state of a connected client.
///
/// The working directory is owned by the session alone and always lies
/// inside the sandbox root.
pub struct Session {
    client_addr: SocketAddr,
    current_dir: PathBuf,
    data_channel: Arc<DataChannel>,
}

impl Session {
    /// Creates a session whose working directory starts at `root`.
    pub fn new(client_addr: SocketAddr, root: &Path, data_channel: Arc<DataChannel>) -> Self {
        Self {
            client_addr,
            current_dir: root.to_path_buf(),
            data_channel,
        }
    }

    /// Returns the client's control connection address.
    pub fn client_addr(&self) -> &SocketAddr {
        &self.client_addr
    }

    /// Returns the current working directory.
    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Returns the session's data channel.
    pub fn data_channel(&self) -> &DataChannel {
        &self.data_channel
    }

    /// Sets the current working directory. Callers validate `path` first.
    pub fn set_current_dir(&mut self, path: PathBuf) {
        self.current_dir = path;
    }
}
