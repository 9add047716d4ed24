use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::client::Session;
use crate::config::ServerConfig;
use crate::error::FtpServerError;
use crate::protocol::responses::{COMMAND_TOO_LONG, greeting};
use crate::protocol::{CommandStatus, format_response, handle_command, parse_command};
use crate::storage::Sandbox;
use crate::transfer::{ChannelRegistry, close_data_channel, open_data_channel};

async fn send_response(write_half: &mut OwnedWriteHalf, body: &str) -> std::io::Result<()> {
    write_half.write_all(format_response(body).as_bytes()).await?;
    write_half.flush().await
}

/// Handles one client session.
///
/// - Opens the session's dedicated data listener and greets the client with
///   its data port.
/// - Reads command lines and answers each before reading the next.
/// - Ends on end-of-stream, a blank line, or a control socket error, then
///   releases the session's data channel.
pub async fn handle_client(
    cmd_stream: TcpStream,
    client_addr: SocketAddr,
    sandbox: Arc<Sandbox>,
    channel_registry: Arc<Mutex<ChannelRegistry>>,
    config: Arc<ServerConfig>,
) -> Result<(), FtpServerError> {
    let local_ip = cmd_stream.local_addr()?.ip();
    let (read_half, mut write_half) = cmd_stream.into_split();

    let data_channel = match open_data_channel(&channel_registry, client_addr, local_ip, &config).await {
        Ok(channel) => channel,
        Err(e) => {
            let _ = send_response(&mut write_half, &e.to_string()).await;
            return Err(e.into());
        }
    };

    let data_port = data_channel.local_addr().port();
    let mut session = Session::new(client_addr, sandbox.root(), data_channel);

    let welcome = greeting(&client_addr.ip().to_string(), data_port);
    let result = match send_response(&mut write_half, &welcome).await {
        Ok(()) => command_loop(&mut session, read_half, &mut write_half, &sandbox, &config).await,
        Err(e) => Err(e.into()),
    };

    close_data_channel(&channel_registry, &client_addr).await;
    info!("Client {} disconnected", client_addr);
    result
}

/// One control line as read off the wire.
#[derive(Debug, PartialEq)]
enum ControlLine {
    Eof,
    Text(String),
    TooLong,
}

/// Reads one line, holding at most `max_len + 1` bytes of it in memory.
///
/// Invalid UTF-8 is replaced rather than rejected. An overlong line is
/// drained up to its newline and reported as `TooLong`.
async fn read_control_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> std::io::Result<ControlLine>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(ControlLine::Eof);
    }

    if buf.len() > max_len {
        if !buf.ends_with(b"\n") {
            skip_line(reader).await?;
        }
        return Ok(ControlLine::TooLong);
    }

    Ok(ControlLine::Text(String::from_utf8_lossy(buf).into_owned()))
}

async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), available.is_empty()),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

async fn command_loop(
    session: &mut Session,
    read_half: OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
    sandbox: &Sandbox,
    config: &ServerConfig,
) -> Result<(), FtpServerError> {
    let client_addr = *session.client_addr();
    let mut reader = BufReader::new(read_half);
    let mut buf = Vec::new();

    loop {
        match read_control_line(&mut reader, &mut buf, config.max_command_length).await {
            Ok(ControlLine::Eof) => {
                info!("Connection closed by client {}", client_addr);
                return Ok(());
            }
            Ok(ControlLine::TooLong) => {
                debug!("Rejected overlong command from {}", client_addr);
                send_response(write_half, COMMAND_TOO_LONG).await?;
            }
            Ok(ControlLine::Text(line)) => {
                if line.trim().is_empty() {
                    info!("Client {} ended the session", client_addr);
                    return Ok(());
                }

                let command = parse_command(&line);
                debug!("Received from {}: {:?}", client_addr, &command);

                let result = handle_command(session, &command, sandbox, config).await;
                if let CommandStatus::Failure(reason) = &result.status {
                    debug!("Command {:?} from {} failed: {}", command, client_addr, reason);
                }

                send_response(write_half, &result.message).await?;
            }
            Err(e) => {
                error!("Failed to read from {}: {}", client_addr, e);
                return Err(e.into());
            }
        }
    }
}
