//! Accounts: registration, sign-in, profile changes, removal

use super::Mailbox;
use crate::model::User;
use crate::{PostboxError, Result};

impl Mailbox {
    /// Look up a registered user by address, ignoring case
    pub fn find_user(&self, address: &str) -> Option<User> {
        let address = address.trim();
        self.store.users().into_iter().find(|u| u.has_address(address))
    }

    /// Create an account
    pub fn register(&self, name: &str, address: &str, password: &str) -> Result<User> {
        let name = name.trim();
        let address = address.trim();

        if name.is_empty() {
            return Err(PostboxError::Validation("Name cannot be empty".to_string()));
        }
        if !self.in_domain(address) {
            return Err(PostboxError::Validation(format!(
                "Please enter a valid {} email address",
                self.rules.domain
            )));
        }
        self.check_password(password)?;
        if self.find_user(address).is_some() {
            return Err(PostboxError::Validation(format!(
                "Email address '{}' is already registered",
                address
            )));
        }

        let user = User::new(name, address, password);
        self.store.add_user(user.clone())?;
        tracing::info!(email = %user.email_id, "Registered user");
        Ok(user)
    }

    /// Check credentials and return the matching user
    pub fn authenticate(&self, address: &str, password: &str) -> Result<User> {
        let user = self
            .find_user(address)
            .ok_or_else(|| PostboxError::UnknownUser(address.trim().to_string()))?;
        if user.password != password {
            tracing::debug!(email = %user.email_id, "Rejected sign-in");
            return Err(PostboxError::WrongPassword(user.email_id));
        }
        Ok(user)
    }

    /// Change the display name and, optionally, the password
    ///
    /// An empty `new_password` counts as no password change.
    pub fn update_profile(
        &self,
        address: &str,
        new_name: &str,
        new_password: Option<&str>,
    ) -> Result<User> {
        let mut user = self
            .find_user(address)
            .ok_or_else(|| PostboxError::UnknownUser(address.trim().to_string()))?;

        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(PostboxError::Validation(
                "Display name cannot be empty".to_string(),
            ));
        }
        let new_password = new_password.filter(|p| !p.is_empty());
        if let Some(password) = new_password {
            self.check_password(password)?;
        }

        let name_changed = user.name != new_name;
        let password_changed = new_password.is_some_and(|p| p != user.password);
        if !name_changed && !password_changed {
            return Err(PostboxError::NoChanges);
        }

        user.name = new_name.to_string();
        if let Some(password) = new_password {
            user.password = password.to_string();
        }
        self.store.update_user(&user)?;
        tracing::info!(email = %user.email_id, name_changed, password_changed, "Updated profile");
        Ok(user)
    }

    /// Remove an account and every email it sent
    ///
    /// Copies the user only received stay behind.
    pub fn delete_account(&self, address: &str, password: &str) -> Result<()> {
        let user = self.authenticate(address, password)?;
        self.store.delete_user(&user)?;
        tracing::info!(email = %user.email_id, "Deleted account");
        Ok(())
    }

    fn check_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.rules.min_password_len {
            return Err(PostboxError::Validation(format!(
                "Password must be at least {} characters",
                self.rules.min_password_len
            )));
        }
        Ok(())
    }
}
