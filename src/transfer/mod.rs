//! Transfer module for the share server
//!
//! Handles per-session data channel pairing, length-prefixed framing, and
//! file/folder transfers over the data connection.

pub mod channel_registry;
pub mod data_channel;
pub mod file_ops;
pub mod framing;

// Re-export key types and functions
pub use channel_registry::{ChannelEntry, ChannelRegistry};
pub use data_channel::{DataChannel, DataStream, close_data_channel, open_data_channel};
pub use file_ops::{receive_file, receive_folder_staged, send_file, send_folder};
pub use framing::{DEFAULT_CHUNK_SIZE, recv_frame, send_frame};
