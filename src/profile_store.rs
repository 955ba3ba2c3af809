//! Profile store: the secondary document database holding each identity's
//! display name and application role.
//!
//! Reads are keyed by identity id. The Firestore-backed client speaks the
//! document REST API; the in-memory store backs offline runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config_loader::{ProfileStoreConfig, SeedProfile};
use crate::errors::{PortalError, PortalResult};
use crate::role::Role;

/// Application-specific user attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    /// Raw role string as stored; see [`Profile::role`].
    pub role: Option<String>,
    pub uid: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            role: Some(role.into()),
            ..Default::default()
        }
    }

    /// Empty or missing role strings mean "no role"; anything else that is
    /// not recognised is `Role::Unknown`.
    pub fn role(&self) -> Option<Role> {
        self.role
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Role::parse)
    }

    fn from_document(doc: Document) -> Option<Profile> {
        let fields = doc.fields?;
        Some(Profile {
            name: string_field(&fields, "Name"),
            role: string_field(&fields, "Role"),
            uid: string_field(&fields, "uID"),
            created_at: fields
                .get("createdAt")
                .and_then(|v| v.timestamp_value.as_deref())
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Option<HashMap<String, FieldValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    #[serde(default)]
    string_value: Option<String>,
    #[serde(default)]
    timestamp_value: Option<String>,
}

fn string_field(fields: &HashMap<String, FieldValue>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(|v| v.string_value.clone())
        .filter(|s| !s.is_empty())
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the identity has no profile record.
    async fn get_profile(&self, identity_id: &str, bearer: Option<&str>)
        -> PortalResult<Option<Profile>>;

    /// Reachability check used by the readiness endpoint.
    async fn test_connection(&self, bearer: Option<&str>) -> bool;
}

pub struct FirestoreProfileStore {
    client: reqwest::Client,
    database_url: String,
    collection: String,
}

impl FirestoreProfileStore {
    pub fn new(config: &ProfileStoreConfig) -> PortalResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(PortalError::config("profile_store.project_id must be set"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortalError::network("build profile store client", e))?;

        Ok(Self {
            client,
            database_url: format!(
                "{}/projects/{}/databases/{}",
                config.base_url.trim_end_matches('/'),
                config.project_id,
                config.database_id
            ),
            collection: config.collection.clone(),
        })
    }

    fn document_url(&self, identity_id: &str) -> PortalResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{}/documents", self.database_url))
            .map_err(|e| PortalError::config(format!("invalid profile store url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| PortalError::config("profile store url cannot be a base"))?
            .push(&self.collection)
            .push(identity_id);
        Ok(url)
    }

    fn request(&self, url: reqwest::Url, bearer: Option<&str>) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ProfileStore for FirestoreProfileStore {
    async fn get_profile(
        &self,
        identity_id: &str,
        bearer: Option<&str>,
    ) -> PortalResult<Option<Profile>> {
        let url = self.document_url(identity_id)?;
        let response = self
            .request(url, bearer)
            .send()
            .await
            .map_err(|e| PortalError::network("fetch profile", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(uid = identity_id, "no profile document");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::profile_store(status.as_u16(), body));
        }

        let doc: Document = response
            .json()
            .await
            .map_err(|e| PortalError::network("decode profile", e))?;
        Ok(Profile::from_document(doc))
    }

    async fn test_connection(&self, bearer: Option<&str>) -> bool {
        let url = match reqwest::Url::parse(&self.database_url) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.request(url, bearer).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "profile store connection check failed");
                false
            }
        }
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: HashMap<String, Profile>,
}

impl InMemoryProfileStore {
    pub fn seeded(seeds: &[SeedProfile]) -> Self {
        let profiles = seeds
            .iter()
            .map(|seed| {
                let profile = Profile {
                    name: seed.name.clone(),
                    role: seed.role.clone(),
                    uid: Some(seed.uid.clone()),
                    created_at: None,
                };
                (seed.uid.clone(), profile)
            })
            .collect();
        Self { profiles }
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(
        &self,
        identity_id: &str,
        _bearer: Option<&str>,
    ) -> PortalResult<Option<Profile>> {
        Ok(self.profiles.get(identity_id).cloned())
    }

    async fn test_connection(&self, _bearer: Option<&str>) -> bool {
        true
    }
}
