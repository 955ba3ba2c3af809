//! Shared session state.
//!
//! Exactly one `SessionPublisher` exists per resolver; it owns the write side
//! of a `watch` channel. Everything else reads through cloned
//! `SessionContext` handles, injected where needed.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;

use crate::errors::{PortalError, PortalResult};
use crate::role::Role;

/// Unified view of who is signed in and what they may do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// `None`: authenticated without a profile role, or not authenticated.
    pub role: Option<Role>,
    pub is_authenticated: bool,
    pub email_verified: bool,
    /// Identity event this session was derived from.
    pub generation: u64,
}

impl Session {
    pub fn anonymous(generation: u64) -> Self {
        Session {
            generation,
            ..Default::default()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.role.is_some_and(|role| allowed.contains(&role))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    /// An identity event is being reconciled; render nothing.
    Resolving,
    Ready(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Resolving => None,
            SessionState::Ready(session) => Some(session),
        }
    }
}

/// Write side, held only by the session resolver.
pub struct SessionPublisher {
    tx: watch::Sender<SessionState>,
}

impl SessionPublisher {
    pub fn new() -> (SessionPublisher, SessionContext) {
        let (tx, rx) = watch::channel(SessionState::Resolving);
        (SessionPublisher { tx }, SessionContext { rx })
    }

    pub fn publish(&self, state: SessionState) {
        self.tx.send_replace(state);
    }
}

/// Read side of the session cell.
#[derive(Debug, Clone)]
pub struct SessionContext {
    rx: watch::Receiver<SessionState>,
}

impl SessionContext {
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.rx.borrow().session().cloned()
    }

    /// Wait until the state leaves `Resolving`.
    pub async fn settled(&self) -> PortalResult<Session> {
        self.wait_until(|session| session.is_some()).await
    }

    /// Wait for a settled session derived from the given identity, bounded by
    /// `timeout`.
    pub async fn wait_for_identity(
        &self,
        identity_id: &str,
        timeout: Duration,
    ) -> PortalResult<Session> {
        let wait = self.wait_until(|session| {
            session.is_some_and(|s| s.identity_id.as_deref() == Some(identity_id))
        });
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| PortalError::internal(format!("session for {identity_id} did not settle")))?
    }

    async fn wait_until(&self, ready: impl Fn(Option<&Session>) -> bool) -> PortalResult<Session> {
        let mut rx = self.rx.clone();
        let state = rx
            .wait_for(|state| ready(state.session()))
            .await
            .map_err(|_| PortalError::internal("session resolver stopped"))?;
        state
            .session()
            .cloned()
            .ok_or_else(|| PortalError::internal("session settled without a value"))
    }
}
