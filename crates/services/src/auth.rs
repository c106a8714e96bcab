//! Authentication seam. Sign-in itself happens elsewhere; the engine only
//! needs to know who the current user is.

use std::sync::RwLock;

use exam_core::model::User;

pub trait AuthProvider: Send + Sync {
    /// The signed-in user, if any.
    fn current_user(&self) -> Option<User>;
}

/// Holds whoever the front end signed in.
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    user: RwLock<Option<User>>,
}

impl StaticAuthProvider {
    #[must_use]
    pub fn signed_in(user: User) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: User) {
        if let Ok(mut guard) = self.user.write() {
            *guard = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.user.write() {
            *guard = None;
        }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn current_user(&self) -> Option<User> {
        self.user.read().ok().and_then(|guard| guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::UserId;

    #[test]
    fn sign_out_clears_user() {
        let auth = StaticAuthProvider::signed_in(User::new(UserId::new(1), "Ana"));
        assert_eq!(auth.current_user().map(|u| u.id), Some(UserId::new(1)));
        auth.sign_out();
        assert!(auth.current_user().is_none());
    }
}
