//! Identity provider interface.
//!
//! The identity provider issues credentials and announces sign-in and
//! sign-out. Consumers never poll it: they `subscribe()` and await changes on
//! the returned `watch` receiver, which always holds the current identity
//! (`None` when signed out).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::{PortalError, PortalResult, SafeLock};

/// How the current credential was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInProvider {
    #[default]
    Password,
    OAuth,
}

/// Identity record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(default)]
    pub provider: SignInProvider,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: Some(email.into()),
            email_verified: true,
            provider: SignInProvider::Password,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn unverified(mut self) -> Self {
        self.email_verified = false;
        self
    }

    pub fn via(mut self, provider: SignInProvider) -> Self {
        self.provider = provider;
        self
    }
}

/// `None` means signed out.
pub type IdentityEvent = Option<Identity>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Receiver holding the current identity; changes on every auth event.
    fn subscribe(&self) -> watch::Receiver<IdentityEvent>;

    fn current_identity(&self) -> Option<Identity>;

    /// Bearer token for the signed-in identity, used by the profile store.
    async fn id_token(&self) -> Option<String>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortalResult<Identity>;

    async fn sign_out(&self) -> PortalResult<()>;
}

/// Account known to the in-process provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_verified")]
    pub email_verified: bool,
    #[serde(default)]
    pub provider: SignInProvider,
}

fn default_verified() -> bool {
    true
}

impl LocalAccount {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            email: Some(self.email.clone()),
            email_verified: self.email_verified,
            provider: self.provider,
        }
    }
}

/// In-process identity provider backed by a fixed account list.
///
/// Used for offline runs and tests; `emit` pushes arbitrary events, which is
/// how tests simulate token refreshes and rapid sign-in/sign-out.
pub struct LocalIdentityProvider {
    accounts: Vec<LocalAccount>,
    events: watch::Sender<IdentityEvent>,
    token: Mutex<Option<String>>,
}

impl LocalIdentityProvider {
    pub fn new(accounts: Vec<LocalAccount>) -> Self {
        let (events, _) = watch::channel(None);
        Self {
            accounts,
            events,
            token: Mutex::new(None),
        }
    }

    /// Announce an identity change. Every sign-in mints a fresh random token;
    /// the token is replaced before subscribers are woken.
    pub fn emit(&self, event: IdentityEvent) {
        let token = event
            .as_ref()
            .map(|identity| format!("local-{}-{}", identity.id, Uuid::new_v4().simple()));
        match self.token.safe_lock() {
            Ok(mut guard) => *guard = token,
            Err(e) => tracing::error!(error = %e, "local token cell unavailable"),
        }
        self.events.send_replace(event);
    }
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn subscribe(&self) -> watch::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    fn current_identity(&self) -> Option<Identity> {
        self.events.borrow().clone()
    }

    async fn id_token(&self) -> Option<String> {
        self.token.safe_lock().ok().and_then(|guard| guard.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortalResult<Identity> {
        let email = email.trim();
        let account = self
            .accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .ok_or_else(|| PortalError::auth("No user found with this email."))?;

        if account.password != password.trim() {
            return Err(PortalError::auth("Incorrect password."));
        }

        let identity = account.identity();
        tracing::info!(uid = %identity.id, "local sign-in");
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> PortalResult<()> {
        self.emit(None);
        Ok(())
    }
}
