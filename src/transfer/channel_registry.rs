//! Module `channel_registry`
//!
//! Keeps one data channel per session, keyed by the session's control
//! connection address. Each entry owns the session's dedicated data listener
//! (through its accept task) and the slot holding the bound data stream, so
//! concurrent sessions never share a data connection.

use log::warn;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::transfer::data_channel::DataChannel;

/// Data channel state owned by a single session.
pub struct ChannelEntry {
    channel: Arc<DataChannel>,
    accept_task: JoinHandle<()>,
}

impl ChannelEntry {
    pub fn new(channel: Arc<DataChannel>, accept_task: JoinHandle<()>) -> Self {
        Self {
            channel,
            accept_task,
        }
    }

    pub fn channel(&self) -> &Arc<DataChannel> {
        &self.channel
    }

    /// Address the session's data listener is bound to.
    pub fn data_socket(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    /// Stops accepting data connections and closes the bound stream.
    pub async fn cleanup_all(self) {
        self.accept_task.abort();
        self.channel.release().await;
    }
}

/// Registry that maps control connection addresses to their data channels.
#[derive(Default)]
pub struct ChannelRegistry {
    registry: HashMap<SocketAddr, ChannelEntry>,
}

impl ChannelRegistry {
    /// Inserts the data channel for a session.
    ///
    /// An entry whose data socket is already registered to another session is
    /// rejected and handed back so the caller can tear it down.
    pub fn insert(&mut self, addr: SocketAddr, entry: ChannelEntry) -> Result<(), ChannelEntry> {
        let port = entry.data_socket().port();
        if self
            .registry
            .iter()
            .any(|(owner, e)| *owner != addr && e.data_socket().port() == port)
        {
            warn!("Attempted to insert a data socket already in use: {}", entry.data_socket());
            return Err(entry);
        }
        self.registry.insert(addr, entry);
        Ok(())
    }

    /// Removes and returns the data channel entry for a session, if any.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<ChannelEntry> {
        self.registry.remove(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&ChannelEntry> {
        self.registry.get(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.registry.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Checks if the given port already backs a session's data listener.
    pub fn is_port_taken(&self, port: u16) -> bool {
        self.registry
            .values()
            .any(|entry| entry.data_socket().port() == port)
    }

    /// Ports in `[base, base + span)` not yet assigned to any session.
    pub fn available_ports(&self, base: u16, span: u16) -> Vec<u16> {
        let end = (u32::from(base) + u32::from(span)).min(u32::from(u16::MAX) + 1);
        (u32::from(base)..end)
            .filter_map(|port| u16::try_from(port).ok())
            .filter(|port| !self.is_port_taken(*port))
            .collect()
    }
}
