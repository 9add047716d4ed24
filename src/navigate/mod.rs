//! Navigate module
//!
//! Handles working-directory changes for sessions.

mod operations;

// Re-export public types and functions
pub use operations::change_directory;
