//! Screens shared by several commands.

pub mod error;

pub use error::ErrorScreen;
