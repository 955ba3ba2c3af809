//! Route authorization.
//!
//! `authorize` is a pure function of the session state, the route's allowed
//! roles and the policy. Authenticated users who lack the role are sent to
//! the default route, never back to login.

use serde::Serialize;

use crate::config_loader::PortalConfig;
use crate::role::Role;
use crate::session_context::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// Session still resolving: render nothing, do not redirect.
    Suspend,
    Permit,
    RedirectToLogin { from: String },
    RedirectToDefault { to: String },
}

impl GateDecision {
    /// Redirect target, with the requested location carried as `from` for
    /// login redirects.
    pub fn location(&self, policy: &AccessPolicy) -> Option<String> {
        match self {
            GateDecision::Suspend | GateDecision::Permit => None,
            GateDecision::RedirectToLogin { from } => Some(format!(
                "{}?from={}",
                policy.login_route,
                urlencoding::encode(from)
            )),
            GateDecision::RedirectToDefault { to } => Some(to.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub login_route: String,
    pub verify_email_route: String,
    pub default_route: String,
    pub require_verified_email: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy {
            login_route: "/login".into(),
            verify_email_route: "/verify-email".into(),
            default_route: "/".into(),
            require_verified_email: true,
        }
    }
}

impl From<&PortalConfig> for AccessPolicy {
    fn from(config: &PortalConfig) -> Self {
        AccessPolicy {
            login_route: config.routes.login.clone(),
            verify_email_route: config.routes.verify_email.clone(),
            default_route: config.routes.default_route.clone(),
            require_verified_email: config.access.require_verified_email,
        }
    }
}

pub fn authorize(
    state: &SessionState,
    allowed: &[Role],
    policy: &AccessPolicy,
    requested: &str,
) -> GateDecision {
    let session = match state {
        SessionState::Resolving => return GateDecision::Suspend,
        SessionState::Ready(session) => session,
    };

    if !session.is_authenticated {
        return GateDecision::RedirectToLogin {
            from: requested.to_string(),
        };
    }

    if policy.require_verified_email && !session.email_verified {
        return GateDecision::RedirectToDefault {
            to: policy.verify_email_route.clone(),
        };
    }

    // A missing role matches nothing, including routes open to every role.
    if !session.has_any_role(allowed) {
        return GateDecision::RedirectToDefault {
            to: policy.default_route.clone(),
        };
    }

    GateDecision::Permit
}
