//! File system storage management
//!
//! Handles sandboxed path validation and directory listings.

pub mod listing;
pub mod validation;

// Re-export commonly used items
pub use listing::{list_directory, list_recursive};
pub use validation::Sandbox;
