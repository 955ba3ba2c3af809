use std::sync::Arc;
use std::time::Duration;

use crate::{
    access_gate::AccessPolicy,
    config_loader::{IdentityBackend, PortalConfig, ProfileBackend, RouteConfig},
    errors::PortalResult,
    identity::{IdentityProvider, LocalIdentityProvider},
    identity_toolkit::IdentityToolkitProvider,
    navigation::PendingNavigation,
    profile_store::{FirestoreProfileStore, InMemoryProfileStore, ProfileStore},
    session_context::SessionContext,
    session_resolver::{ResolverHandle, ResolverSettings, SessionResolver},
};

/// Everything the HTTP handlers share. The session is read-only here; the
/// resolver task behind `ResolverHandle` is its only writer.
pub struct AppState {
    pub session: SessionContext,
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub navigation: Arc<PendingNavigation>,
    pub policy: AccessPolicy,
    pub routes: RouteConfig,
    pub resolve_wait: Duration,
}

impl AppState {
    /// Build collaborators from config and start the resolver. Must be called
    /// inside a tokio runtime.
    pub fn bootstrap(config: &PortalConfig) -> PortalResult<(Arc<AppState>, ResolverHandle)> {
        let identity: Arc<dyn IdentityProvider> = match config.identity.backend {
            IdentityBackend::Local => Arc::new(LocalIdentityProvider::new(
                config.identity.local_accounts.clone(),
            )),
            IdentityBackend::IdentityToolkit => {
                Arc::new(IdentityToolkitProvider::new(&config.identity)?)
            }
        };
        let profiles: Arc<dyn ProfileStore> = match config.profile_store.backend {
            ProfileBackend::Memory => {
                Arc::new(InMemoryProfileStore::seeded(&config.profile_store.profiles))
            }
            ProfileBackend::Firestore => Arc::new(FirestoreProfileStore::new(&config.profile_store)?),
        };
        tracing::info!(
            identity = ?config.identity.backend,
            profiles = ?config.profile_store.backend,
            "collaborators configured"
        );

        Ok(Self::with_collaborators(config, identity, profiles))
    }

    pub fn with_collaborators(
        config: &PortalConfig,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> (Arc<AppState>, ResolverHandle) {
        let navigation = Arc::new(PendingNavigation::new());
        let (resolver, session) = SessionResolver::new(
            Arc::clone(&identity),
            Arc::clone(&profiles),
            navigation.clone(),
            ResolverSettings::from(config),
        );
        let handle = resolver.spawn();

        let state = AppState {
            session,
            identity,
            profiles,
            navigation,
            policy: AccessPolicy::from(config),
            routes: config.routes.clone(),
            resolve_wait: Duration::from_secs(config.server.resolve_wait_secs),
        };
        (Arc::new(state), handle)
    }
}
