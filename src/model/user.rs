//! User accounts

use super::email::same_address;
use serde::{Deserialize, Serialize};

/// A registered mailbox owner
///
/// `email_id` is the identity key everywhere and compares case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name
    pub name: String,
    /// Mailbox address, unique across all users
    pub email_id: String,
    /// Plaintext credential, compared by equality only
    pub password: String,
}

impl User {
    /// Create a new user
    pub fn new(
        name: impl Into<String>,
        email_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email_id: email_id.into(),
            password: password.into(),
        }
    }

    /// True iff this user owns `address`
    pub fn has_address(&self, address: &str) -> bool {
        same_address(&self.email_id, address)
    }

    /// First word of the display name, used for greetings
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_address() {
        let user = User::new("Alice Liddell", "Alice@mail.cm", "secret1");
        assert!(user.has_address("alice@MAIL.cm"));
        assert!(!user.has_address("bob@mail.cm"));
    }

    #[test]
    fn test_first_name() {
        assert_eq!(User::new("Alice Liddell", "a@mail.cm", "x").first_name(), "Alice");
        assert_eq!(User::new("", "a@mail.cm", "x").first_name(), "");
    }
}
