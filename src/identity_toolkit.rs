//! REST client for the hosted identity service (`accounts:*` endpoints).
//!
//! Only the password flow is driven from the server side. The id token is
//! kept in memory and handed to the profile store as a bearer token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::config_loader::IdentityConfig;
use crate::errors::{PortalError, PortalResult};
use crate::identity::{Identity, IdentityEvent, IdentityProvider, SignInProvider};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    email_verified: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map the service's error codes to the messages shown on the login page.
fn auth_message(code: &str) -> &'static str {
    match code {
        "INVALID_PASSWORD" => "Incorrect password.",
        "EMAIL_NOT_FOUND" => "No user found with this email.",
        "INVALID_LOGIN_CREDENTIALS" => {
            "Invalid credentials. Please check your email and password."
        }
        "USER_DISABLED" => "This account has been disabled.",
        _ => "Sign-in failed. Please try again.",
    }
}

pub struct IdentityToolkitProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    id_token: RwLock<Option<String>>,
    events: watch::Sender<IdentityEvent>,
}

impl IdentityToolkitProvider {
    pub fn new(config: &IdentityConfig) -> PortalResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PortalError::config("identity.api_key must be set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortalError::network("build identity client", e))?;
        let (events, _) = watch::channel(None);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            id_token: RwLock::new(None),
            events,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, method, self.api_key)
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &Req,
    ) -> PortalResult<Resp> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| PortalError::network(format!("accounts:{method}"), e))?;

        if response.status().is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| PortalError::network(format!("decode accounts:{method}"), e));
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) if status == 400 => Err(PortalError::auth(auth_message(&envelope.error.message))),
            _ => Err(PortalError::internal(format!(
                "identity service returned {status}: {text}"
            ))),
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    fn subscribe(&self) -> watch::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    fn current_identity(&self) -> Option<Identity> {
        self.events.borrow().clone()
    }

    async fn id_token(&self) -> Option<String> {
        self.id_token.read().await.clone()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortalResult<Identity> {
        let signed_in: SignInResponse = self
            .post(
                "signInWithPassword",
                &SignInRequest {
                    email: email.trim(),
                    password: password.trim(),
                    return_secure_token: true,
                },
            )
            .await?;

        let lookup: LookupResponse = self
            .post(
                "lookup",
                &LookupRequest {
                    id_token: &signed_in.id_token,
                },
            )
            .await?;
        let email_verified = lookup.users.first().map(|u| u.email_verified).unwrap_or(false);

        let identity = Identity {
            id: signed_in.local_id,
            display_name: signed_in.display_name.filter(|n| !n.is_empty()),
            email: signed_in.email,
            email_verified,
            provider: SignInProvider::Password,
        };

        *self.id_token.write().await = Some(signed_in.id_token);
        tracing::info!(uid = %identity.id, verified = identity.email_verified, "identity toolkit sign-in");
        self.events.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> PortalResult<()> {
        *self.id_token.write().await = None;
        self.events.send_replace(None);
        Ok(())
    }
}
