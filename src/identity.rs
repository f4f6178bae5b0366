use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::UserId;

/// The current user as reported by the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, falling back to the local part of the email address.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or(self.email.as_str())
                .to_string(),
        }
    }
}

/// Read-only view onto whoever is signed in on this client.
///
/// Returning `None` means presence runs in a degraded "offline" mode;
/// editing itself never depends on this.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn current_user(&self) -> Option<Identity>;
}

/// Fixed identity, used by the binaries and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<Identity>,
}

impl StaticIdentity {
    pub fn of(identity: Identity) -> Self {
        Self {
            user: Some(identity),
        }
    }

    /// A provider with nobody signed in.
    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<Identity> {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_explicit_name() {
        let identity = Identity::new("u1", "ada@example.com").with_name("Ada Lovelace");
        assert_eq!(identity.display_name(), "Ada Lovelace");
    }

    #[test]
    fn display_name_falls_back_to_email_local_part() {
        let identity = Identity::new("u1", "ada@example.com");
        assert_eq!(identity.display_name(), "ada");
    }

    #[test]
    fn empty_name_falls_back_to_email_local_part() {
        let identity = Identity::new("u1", "grace@example.com").with_name("");
        assert_eq!(identity.display_name(), "grace");
    }
}
