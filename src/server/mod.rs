//! Server core functionality
//!
//! This module contains the control listener and its accept loop.

pub mod core;

pub use core::Server;
