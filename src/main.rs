//! RAX Share Server - Entry Point
//!
//! Serves a sandboxed folder over a line-based control channel paired with a
//! framed binary data channel.

use clap::Parser;
use log::info;
use std::path::Path;

use rax_share::Server;
use rax_share::config::{ConfigOverrides, DEFAULT_CONFIG_PATH, ServerConfig};
use rax_share::error::FtpServerError;
use rax_share::utils::logging::setup_logging;

#[derive(Debug, Parser)]
#[command(name = "rax-share", version, about = "Sandboxed remote file-access server")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Address to bind the control listener
    #[arg(short, long)]
    bind: Option<String>,

    /// Control port
    #[arg(short, long)]
    port: Option<u16>,

    /// First data port (defaults to control port + 1)
    #[arg(short, long)]
    data_port: Option<u16>,

    /// Folder to share
    #[arg(short, long)]
    root: Option<String>,

    /// Append log records to this file
    #[arg(short, long)]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), FtpServerError> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        bind_address: cli.bind,
        control_port: cli.port,
        data_port: cli.data_port,
        server_root: cli.root,
        log_file: cli.log_file,
    };
    let config = ServerConfig::load(&cli.config, &overrides)?;

    setup_logging(config.log_file.as_deref().map(Path::new))?;

    info!("Launching share server...");

    let server = Server::new(config).await?;
    server.start().await;
    Ok(())
}
