//! Postbox - single-machine mailbox engine
//!
//! Postbox stores user accounts and email messages and keeps every stored copy
//! of a message consistent as it moves between inbox, archive, trash, and
//! sent, including the time-windowed "unsend" of freshly sent mail.
//!
//! # Architecture
//!
//! - **model**: Users, email copies, and their status
//! - **store**: Persistence port with interchangeable flat-file and SQLite
//!   backends, plus attachment storage
//! - **mailbox**: Views, compose, status transitions, unsend, and accounts
//! - **reload**: Off-thread store reloads
//! - **config**: YAML configuration and validation

pub mod config;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod model;
pub mod reload;
pub mod store;

pub use error::{PostboxError, Result};
