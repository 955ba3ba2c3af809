//! Session resolver: turns identity-provider events into the shared session.
//!
//! The resolver runs as its own task. For each identity event it publishes
//! `Resolving`, looks the identity up in the profile store, merges the two
//! sources and publishes the result. The first settled sign-in of a login
//! lifecycle also forces one navigation to the role's landing route.
//!
//! A lookup is raced against the next identity change. When a newer event
//! arrives first the stale lookup is dropped, so a slow response can never
//! overwrite the session of a later identity.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config_loader::PortalConfig;
use crate::errors::{PortalError, PortalResult};
use crate::identity::{Identity, IdentityEvent, IdentityProvider, SignInProvider};
use crate::navigation::Navigator;
use crate::profile_store::{Profile, ProfileStore};
use crate::role::Role;
use crate::session_context::{Session, SessionContext, SessionPublisher, SessionState};

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub admin_landing: String,
    pub user_landing: String,
    pub admin_email_domain: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            admin_landing: "/admin".into(),
            user_landing: "/user".into(),
            admin_email_domain: None,
        }
    }
}

impl From<&PortalConfig> for ResolverSettings {
    fn from(config: &PortalConfig) -> Self {
        ResolverSettings {
            admin_landing: config.routes.admin_landing.clone(),
            user_landing: config.routes.user_landing.clone(),
            admin_email_domain: config
                .access
                .admin_email_domain
                .clone()
                .filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Reconcile an identity with its profile record.
///
/// Name precedence is profile name, then provider display name, then the
/// local part of the email. The role comes from the profile only, apart from
/// the optional email-domain fallback for OAuth sign-ins.
pub fn merge_session(
    identity: &Identity,
    profile: Option<&Profile>,
    admin_email_domain: Option<&str>,
    generation: u64,
) -> PortalResult<Session> {
    let email_local_part = identity
        .email
        .as_deref()
        .and_then(|email| email.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_string);

    let display_name = profile
        .and_then(|p| p.name.clone().filter(|n| !n.trim().is_empty()))
        .or_else(|| identity.display_name.clone().filter(|n| !n.is_empty()))
        .or(email_local_part)
        .ok_or_else(|| {
            PortalError::validation("identity", format!("{} has no name or email", identity.id))
        })?;

    let role = profile.and_then(Profile::role).or_else(|| {
        let domain = admin_email_domain?;
        if identity.provider != SignInProvider::OAuth {
            return None;
        }
        let email = identity.email.as_deref()?;
        let suffix = format!("@{}", domain.trim_start_matches('@'));
        Some(if email.to_lowercase().ends_with(&suffix.to_lowercase()) {
            Role::Admin
        } else {
            Role::User
        })
    });

    Ok(Session {
        identity_id: Some(identity.id.clone()),
        display_name: Some(display_name),
        email: identity.email.clone(),
        role,
        is_authenticated: true,
        email_verified: identity.email_verified,
        generation,
    })
}

async fn lookup_profile(
    provider: &dyn IdentityProvider,
    profiles: &dyn ProfileStore,
    identity: &Identity,
) -> Option<Profile> {
    let token = provider.id_token().await;
    match profiles.get_profile(&identity.id, token.as_deref()).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(uid = %identity.id, error = %e, "profile lookup failed; continuing without role");
            None
        }
    }
}

pub struct SessionResolver {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    navigator: Arc<dyn Navigator>,
    publisher: SessionPublisher,
    settings: ResolverSettings,
    redirected: bool,
    generation: u64,
}

impl SessionResolver {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        navigator: Arc<dyn Navigator>,
        settings: ResolverSettings,
    ) -> (SessionResolver, SessionContext) {
        let (publisher, context) = SessionPublisher::new();
        let resolver = SessionResolver {
            provider,
            profiles,
            navigator,
            publisher,
            settings,
            redirected: false,
            generation: 0,
        };
        (resolver, context)
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    /// Process one event to completion without racing later events.
    pub async fn on_identity_event(&mut self, event: IdentityEvent) {
        if let Some(identity) = self.begin(event) {
            let profile =
                lookup_profile(self.provider.as_ref(), self.profiles.as_ref(), &identity).await;
            self.apply(identity, profile);
        }
    }

    /// Start the resolver task. The handle owns the task; dropping it stops
    /// the subscription.
    pub fn spawn(self) -> ResolverHandle {
        let events = self.provider.subscribe();
        let task = tokio::spawn(self.run(events));
        ResolverHandle { task: Some(task) }
    }

    async fn run(mut self, mut events: watch::Receiver<IdentityEvent>) {
        let mut pending = Some(events.borrow_and_update().clone());

        loop {
            let event = match pending.take() {
                Some(event) => event,
                None => {
                    if events.changed().await.is_err() {
                        break;
                    }
                    events.borrow_and_update().clone()
                }
            };

            let Some(identity) = self.begin(event) else {
                continue;
            };

            let provider = Arc::clone(&self.provider);
            let profiles = Arc::clone(&self.profiles);
            tokio::select! {
                profile = lookup_profile(provider.as_ref(), profiles.as_ref(), &identity) => {
                    self.apply(identity, profile);
                }
                Ok(()) = events.changed() => {
                    tracing::debug!(uid = %identity.id, "identity changed during profile lookup; dropping stale result");
                    pending = Some(events.borrow_and_update().clone());
                }
            }
        }

        tracing::info!("identity provider closed; session resolver stopping");
    }

    /// Handle the synchronous half of an event. Returns the identity when a
    /// profile lookup is still needed.
    fn begin(&mut self, event: IdentityEvent) -> Option<Identity> {
        self.generation += 1;
        match event {
            None => {
                tracing::info!(generation = self.generation, "signed out; publishing anonymous session");
                self.redirected = false;
                self.publisher
                    .publish(SessionState::Ready(Session::anonymous(self.generation)));
                None
            }
            Some(identity) => {
                tracing::debug!(uid = %identity.id, generation = self.generation, "resolving session");
                self.publisher.publish(SessionState::Resolving);
                Some(identity)
            }
        }
    }

    fn apply(&mut self, identity: Identity, profile: Option<Profile>) {
        let session = match merge_session(
            &identity,
            profile.as_ref(),
            self.settings.admin_email_domain.as_deref(),
            self.generation,
        ) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(uid = %identity.id, error = %e, "session merge failed; publishing degraded session");
                Session {
                    identity_id: Some(identity.id.clone()),
                    display_name: Some(identity.id.clone()),
                    email: identity.email.clone(),
                    role: None,
                    is_authenticated: true,
                    email_verified: identity.email_verified,
                    generation: self.generation,
                }
            }
        };

        let target = if session.is_admin() {
            self.settings.admin_landing.clone()
        } else {
            self.settings.user_landing.clone()
        };
        tracing::info!(
            uid = %identity.id,
            role = ?session.role,
            generation = session.generation,
            "session resolved"
        );
        self.publisher.publish(SessionState::Ready(session));

        if !self.redirected {
            self.redirected = true;
            tracing::info!(uid = %identity.id, %target, "post-login navigation");
            self.navigator.navigate(&target);
        }
    }
}

/// Owns the running resolver task.
pub struct ResolverHandle {
    task: Option<JoinHandle<()>>,
}

impl ResolverHandle {
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for ResolverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
