//! Module `data_channel`
//!
//! Pairs each session with its data connection. Every session gets a
//! dedicated listener whose accept task stores connections from the session's
//! client in the session's own slot; handlers wait on that slot with a
//! bounded timeout.

use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tokio::time::{Instant, sleep, timeout_at};

use crate::config::ServerConfig;
use crate::error::TransferError;
use crate::transfer::{ChannelEntry, ChannelRegistry};

/// The data connection slot of one session.
pub struct DataChannel {
    local_addr: SocketAddr,
    stream: Arc<Mutex<Option<TcpStream>>>,
    bound: Notify,
}

/// Exclusive access to a bound data stream for the duration of a transfer.
pub struct DataStream {
    guard: OwnedMutexGuard<Option<TcpStream>>,
}

impl DataStream {
    pub fn get_mut(&mut self) -> Result<&mut TcpStream, TransferError> {
        self.guard.as_mut().ok_or(TransferError::ConnectionClosed)
    }

    /// Drops a stream that failed mid-transfer so the next command waits for
    /// a fresh connection instead of reading a desynchronised one.
    pub async fn discard(mut self) {
        if let Some(mut stream) = self.guard.take() {
            let _ = stream.shutdown().await;
        }
    }
}

impl DataChannel {
    pub fn new(local_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            stream: Arc::new(Mutex::new(None)),
            bound: Notify::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Binds a data connection, replacing any previous one.
    pub async fn bind(&self, stream: TcpStream) {
        let previous = self.stream.lock().await.replace(stream);
        if let Some(mut old) = previous {
            debug!("Replacing data connection on {}", self.local_addr);
            let _ = old.shutdown().await;
        }
        self.bound.notify_one();
    }

    pub async fn is_bound(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// Waits until a data connection is bound, at most `wait`.
    pub async fn acquire(&self, wait: Duration) -> Result<DataStream, TransferError> {
        let deadline = Instant::now() + wait;
        loop {
            let guard = Arc::clone(&self.stream).lock_owned().await;
            if guard.is_some() {
                return Ok(DataStream { guard });
            }
            drop(guard);

            if timeout_at(deadline, self.bound.notified()).await.is_err() {
                return Err(TransferError::DataChannelTimeout(wait.as_secs()));
            }
        }
    }

    /// Closes the bound stream, if any.
    pub async fn release(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}

/// Opens the dedicated data listener for a session and registers it.
///
/// The listener binds `bind_ip` on the first free port of the configured
/// range (port 0 lets the OS choose) and only accepts connections coming
/// from the session's client IP.
pub async fn open_data_channel(
    channel_registry: &Mutex<ChannelRegistry>,
    client_addr: SocketAddr,
    bind_ip: IpAddr,
    config: &ServerConfig,
) -> Result<Arc<DataChannel>, TransferError> {
    let mut registry = channel_registry.lock().await;

    // Replacement behavior for a stale entry
    if let Some(stale) = registry.remove(&client_addr) {
        info!("Replacing existing data channel for client {}", client_addr);
        stale.cleanup_all().await;
    }

    let listener = bind_listener(&registry, bind_ip, config.data_port(), config.data_port_span).await?;
    let local_addr = listener.local_addr()?;
    let channel = Arc::new(DataChannel::new(local_addr));

    let accept_task = tokio::spawn(accept_data_connections(
        listener,
        Arc::clone(&channel),
        client_addr,
    ));

    let entry = ChannelEntry::new(Arc::clone(&channel), accept_task);
    if let Err(rejected) = registry.insert(client_addr, entry) {
        rejected.cleanup_all().await;
        return Err(TransferError::NoAvailablePort);
    }

    info!(
        "Client {} bound to data socket {} ({} active sessions)",
        client_addr,
        local_addr,
        registry.len()
    );

    Ok(channel)
}

/// Completely cleans up data channel resources for a session.
pub async fn close_data_channel(channel_registry: &Mutex<ChannelRegistry>, client_addr: &SocketAddr) {
    let entry = channel_registry.lock().await.remove(client_addr);
    if let Some(entry) = entry {
        let data_socket = entry.data_socket();
        entry.cleanup_all().await;
        info!(
            "Closed data channel {} for client {}",
            data_socket, client_addr
        );
    }
}

async fn bind_listener(
    registry: &ChannelRegistry,
    bind_ip: IpAddr,
    base_port: u16,
    span: u16,
) -> Result<TcpListener, TransferError> {
    if base_port == 0 {
        let addr = SocketAddr::new(bind_ip, 0);
        return TcpListener::bind(addr)
            .await
            .map_err(|e| TransferError::PortBindingFailed(addr, e));
    }

    for port in registry.available_ports(base_port, span) {
        let addr = SocketAddr::new(bind_ip, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => continue,
            Err(e) => {
                warn!("Failed to bind data listener on {}: {}", addr, e);
                continue;
            }
        }
    }

    Err(TransferError::NoAvailablePort)
}

fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

/// Accept loop of one session's data listener.
async fn accept_data_connections(
    listener: TcpListener,
    channel: Arc<DataChannel>,
    client_addr: SocketAddr,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if !same_host(peer_addr.ip(), client_addr.ip()) {
                    warn!(
                        "Rejected data connection from {} for client {}'s channel",
                        peer_addr, client_addr
                    );
                    continue;
                }

                info!(
                    "Data connection accepted from {} for client {}",
                    peer_addr, client_addr
                );
                channel.bind(stream).await;
            }
            Err(e) => {
                error!(
                    "Error accepting data connection for client {}: {}",
                    client_addr, e
                );
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn acquire_times_out_without_connection() {
        let channel = DataChannel::new("127.0.0.1:0".parse().unwrap());
        let result = channel.acquire(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransferError::DataChannelTimeout(_))));
    }

    #[tokio::test]
    async fn acquire_wakes_when_bound() {
        let channel = Arc::new(DataChannel::new("127.0.0.1:0".parse().unwrap()));
        let waiter = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.acquire(Duration::from_secs(5)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (_client, server_side) = loopback_pair().await;
        channel.bind(server_side).await;
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn binding_is_reused_across_transfers() {
        let channel = DataChannel::new("127.0.0.1:0".parse().unwrap());
        let (_client, server_side) = loopback_pair().await;
        channel.bind(server_side).await;
        drop(channel.acquire(Duration::from_secs(1)).await.unwrap());
        assert!(channel.is_bound().await);
        let second = channel.acquire(Duration::from_secs(1)).await.unwrap();
        second.discard().await;
        assert!(!channel.is_bound().await);
    }

    #[tokio::test]
    async fn sessions_get_distinct_listeners() {
        let registry = Mutex::new(ChannelRegistry::default());
        let config = ServerConfig {
            control_port: 0,
            ..ServerConfig::default()
        };
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let a = open_data_channel(&registry, "127.0.0.1:40000".parse().unwrap(), ip, &config)
            .await
            .unwrap();
        let b = open_data_channel(&registry, "127.0.0.1:40001".parse().unwrap(), ip, &config)
            .await
            .unwrap();
        assert_ne!(a.local_addr(), b.local_addr());

        let _data = TcpStream::connect(a.local_addr()).await.unwrap();
        assert!(a.acquire(Duration::from_secs(2)).await.is_ok());
        assert!(matches!(
            b.acquire(Duration::from_millis(100)).await,
            Err(TransferError::DataChannelTimeout(_))
        ));

        close_data_channel(&registry, &"127.0.0.1:40000".parse().unwrap()).await;
        assert_eq!(registry.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn connections_from_other_hosts_are_rejected() {
        let registry = Mutex::new(ChannelRegistry::default());
        let config = ServerConfig {
            control_port: 0,
            ..ServerConfig::default()
        };
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        // The session's client is 127.0.0.2; the data connection below comes from 127.0.0.1.
        let channel = open_data_channel(&registry, "127.0.0.2:40000".parse().unwrap(), ip, &config)
            .await
            .unwrap();

        let _data = TcpStream::connect(channel.local_addr()).await.unwrap();
        assert!(matches!(
            channel.acquire(Duration::from_millis(200)).await,
            Err(TransferError::DataChannelTimeout(_))
        ));
        assert!(!channel.is_bound().await);
    }

    #[test]
    fn mapped_ipv4_matches_plain_ipv4() {
        let plain: IpAddr = "127.0.0.1".parse().unwrap();
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(same_host(plain, mapped));
        assert!(!same_host(plain, "127.0.0.2".parse().unwrap()));
    }
}
