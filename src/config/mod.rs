//! Configuration system
//!
//! Loads ~/.config/postbox/config.yaml with:
//! - Backend selection (flat_file or sqlite), fixed for the process lifetime
//! - Data directory for store files and attachments
//! - Mailbox rules (address domain, unsend window, password length)

mod postbox_config;
pub mod validation;

pub use postbox_config::PostboxConfig;
pub use validation::{validate_config, validate_config_result, ValidationError};
