//! API request handlers.

/// Coordinator dispatch handler.
pub mod dispatch;
/// Health and configuration handlers.
pub mod system;
