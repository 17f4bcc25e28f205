//! Active-session collaborator.

use parking_lot::RwLock;

/// Exposes whether a caller is authenticated.
///
/// Save fails fast with [`crate::SyncError::NoActiveUser`] before
/// attempting any network stage when no user is active.
pub trait SessionProvider: Send + Sync {
    /// Returns the id of the active user, if any.
    fn active_user(&self) -> Option<String>;
}

/// An in-process session holder.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<String>>,
}

impl StaticSession {
    /// Creates a session with an authenticated user.
    pub fn authenticated(user: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(user.into())),
        }
    }

    /// Creates a session with no active user.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Replaces the active user.
    pub fn set_user(&self, user: Option<String>) {
        *self.user.write() = user;
    }
}

impl SessionProvider for StaticSession {
    fn active_user(&self) -> Option<String> {
        self.user.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_states() {
        let session = StaticSession::signed_out();
        assert!(session.active_user().is_none());

        session.set_user(Some("alice".into()));
        assert_eq!(session.active_user().as_deref(), Some("alice"));

        let session = StaticSession::authenticated("bob");
        assert_eq!(session.active_user().as_deref(), Some("bob"));
    }
}
