//! Client session management
//!
//! Handles control connections, session state, and the command loop.

pub mod handler;
pub mod state;

pub use handler::handle_client;
pub use state::Session;
