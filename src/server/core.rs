use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::error::FtpServerError;
use crate::storage::Sandbox;
use crate::transfer::ChannelRegistry;

pub struct Server {
    channel_registry: Arc<Mutex<ChannelRegistry>>,
    listener: TcpListener,
    sandbox: Arc<Sandbox>,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Prepares the sandbox root and binds the control listener.
    pub async fn new(config: ServerConfig) -> Result<Self, FtpServerError> {
        let sandbox = Sandbox::open(&config.server_root_path()).map_err(|e| {
            error!("Failed to prepare server root {}: {}", config.server_root, e);
            e
        })?;
        info!("Server root directory: {}", sandbox.root().display());

        let control_socket = config.control_socket();
        let listener = match TcpListener::bind(&control_socket).await {
            Ok(listener) => {
                info!("Server bound to {}", control_socket);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", control_socket, e);
                return Err(e.into());
            }
        };

        Ok(Self {
            channel_registry: Arc::new(Mutex::new(ChannelRegistry::default())),
            listener,
            sandbox: Arc::new(sandbox),
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Accept loop: every control connection becomes its own session task.
    pub async fn start(&self) {
        info!(
            "Starting RAX share server on {} (data ports from {})",
            self.config.control_socket(),
            self.config.data_port()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Client connected: {}", addr);
                    let sandbox = Arc::clone(&self.sandbox);
                    let channel_registry = Arc::clone(&self.channel_registry);
                    let config = Arc::clone(&self.config);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_client(stream, addr, sandbox, channel_registry, config).await
                        {
                            warn!("Session with client {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}
