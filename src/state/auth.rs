#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use tokio::sync::watch;

use crate::services::identity::User;

/// Signed-in user as last reported by the identity provider.
///
/// `loading` is true until the first report has been read; nothing is
/// routable before that.
#[derive(Clone, Debug)]
pub struct AuthState {
    pub user: Option<User>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

impl AuthState {
    /// Pull the latest user from a provider subscription. Returns whether
    /// the state changed.
    pub fn sync(&mut self, changes: &mut watch::Receiver<Option<User>>) -> bool {
        if !self.loading && !changes.has_changed().unwrap_or(false) {
            return false;
        }
        let user = changes.borrow_and_update().clone();
        let changed = self.loading || user != self.user;
        self.user = user;
        self.loading = false;
        changed
    }

    /// Where the front-end should be given this state and the auth screen
    /// the user last asked for.
    #[must_use]
    pub fn route(&self, requested: AuthScreen) -> Route {
        if self.loading {
            return Route::Loading;
        }
        route_for(self.user.as_ref(), requested)
    }
}

/// Screens shown while signed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthScreen {
    #[default]
    Login,
    Signup,
    ResetPassword,
}

/// Top-level destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// The provider has not reported a user state yet.
    Loading,
    Auth(AuthScreen),
    Chat,
}

/// Signed-out users get an auth screen; signed-in users always get the chat.
#[must_use]
pub fn route_for(user: Option<&User>, requested: AuthScreen) -> Route {
    match user {
        Some(_) => Route::Chat,
        None => Route::Auth(requested),
    }
}
