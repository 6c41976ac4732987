//! Command handlers for charade.
//!
//! # Commands
//! - `record`: record, generate and play back (default), plus `upload`
//! - `play`: replay the last generated audio
//! - `list_devices`: list audio devices
//! - `logs`: display recent log entries
//! - `config`: open the configuration file in an editor
//! - `about`: project title and links

pub mod about;
pub mod config;
pub mod list_devices;
pub mod logs;
pub mod play;
pub mod record;

pub use about::handle_about;
pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use play::handle_play;
pub use record::{handle_record, handle_upload};
