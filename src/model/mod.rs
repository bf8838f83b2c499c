//! Entity model
//!
//! Users, stored email copies, and the status enumeration.

mod email;
mod user;

pub use email::{same_address, CopyId, Email, EmailStatus, MessageId};
pub use user::User;
