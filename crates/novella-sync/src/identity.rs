//! Who is acting. Used to stamp ownership, likes and comment authors.

use std::sync::RwLock;

use novella_shared::constants::{ANONYMOUS_AUTHOR, ANONYMOUS_USER_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
}

pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<Identity>;

    fn user_id_or_anonymous(&self) -> String {
        self.current_user()
            .map(|u| u.user_id)
            .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string())
    }

    fn display_name_or_anonymous(&self) -> String {
        self.current_user()
            .map(|u| u.display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_AUTHOR.to_string())
    }
}

/// An identity set by the host application on sign-in and sign-out.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    current: RwLock<Option<Identity>>,
}

impl StaticIdentity {
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: Identity) {
        if let Ok(mut guard) = self.current.write() {
            *guard = Some(identity);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.current.write() {
            *guard = None;
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Identity> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_fallbacks() {
        let identity = StaticIdentity::anonymous();
        assert_eq!(identity.user_id_or_anonymous(), ANONYMOUS_USER_ID);
        assert_eq!(identity.display_name_or_anonymous(), ANONYMOUS_AUTHOR);

        identity.sign_in(Identity {
            user_id: "u1".into(),
            display_name: String::new(),
            email: "u1@example.com".into(),
        });
        assert_eq!(identity.user_id_or_anonymous(), "u1");
        assert_eq!(identity.display_name_or_anonymous(), ANONYMOUS_AUTHOR);

        identity.sign_out();
        assert!(identity.current_user().is_none());
    }
}
