//! Type definitions module
//!
//! Conversation turns shared by the context subsystem, the model client
//! and the analysis session.

pub mod messages;

// Re-export commonly used types
pub use messages::{Role, Turn};
