use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{PortalError, PortalResult};
use crate::identity::LocalAccount;

const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalConfig {
    pub server: ServerConfig,
    pub routes: RouteConfig,
    pub access: AccessConfig,
    pub profile_store: ProfileStoreConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound a login request waits for the session to settle.
    pub resolve_wait_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            resolve_wait_secs: 10,
        }
    }
}

/// Navigation targets used by the resolver and the access gate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    pub login: String,
    pub verify_email: String,
    pub admin_landing: String,
    pub user_landing: String,
    pub default_route: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        RouteConfig {
            login: "/login".into(),
            verify_email: "/verify-email".into(),
            admin_landing: "/admin".into(),
            user_landing: "/user".into(),
            default_route: "/".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    pub require_verified_email: bool,
    /// OAuth sign-ins without a profile role get `admin` when their email
    /// belongs to this domain, `user` otherwise. Unset disables the fallback.
    pub admin_email_domain: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig {
            require_verified_email: true,
            admin_email_domain: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileBackend {
    Firestore,
    Memory,
}

/// Profile record seeded into the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SeedProfile {
    pub uid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileStoreConfig {
    pub backend: ProfileBackend,
    pub base_url: String,
    pub project_id: String,
    pub database_id: String,
    pub collection: String,
    pub timeout_secs: u64,
    pub profiles: Vec<SeedProfile>,
}

impl Default for ProfileStoreConfig {
    fn default() -> Self {
        ProfileStoreConfig {
            backend: ProfileBackend::Memory,
            base_url: "https://firestore.googleapis.com/v1".into(),
            project_id: String::new(),
            database_id: "dawood".into(),
            collection: "user".into(),
            timeout_secs: 10,
            profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityBackend {
    Local,
    IdentityToolkit,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub backend: IdentityBackend,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub local_accounts: Vec<LocalAccount>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            backend: IdentityBackend::Local,
            api_key: None,
            base_url: "https://identitytoolkit.googleapis.com/v1".into(),
            timeout_secs: 10,
            local_accounts: Vec::new(),
        }
    }
}

impl PortalConfig {
    pub fn validate(&self) -> PortalResult<()> {
        if self.profile_store.backend == ProfileBackend::Firestore
            && self.profile_store.project_id.trim().is_empty()
        {
            return Err(PortalError::validation(
                "profile_store.project_id",
                "must be set for the firestore backend",
            ));
        }

        if self.identity.backend == IdentityBackend::IdentityToolkit
            && self
                .identity
                .api_key
                .as_deref()
                .map_or(true, |k| k.trim().is_empty())
        {
            return Err(PortalError::validation(
                "identity.api_key",
                "must be set for the identity_toolkit backend",
            ));
        }

        let routes = [
            ("routes.login", &self.routes.login),
            ("routes.verify_email", &self.routes.verify_email),
            ("routes.admin_landing", &self.routes.admin_landing),
            ("routes.user_landing", &self.routes.user_landing),
            ("routes.default_route", &self.routes.default_route),
        ];
        for (field, path) in routes {
            if !path.starts_with('/') {
                return Err(PortalError::validation(field, "route paths must start with '/'"));
            }
        }

        Ok(())
    }
}

/// Resolve which TOML file to read: explicit path, then `portal.toml` in the
/// working directory, then the per-user config directory.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("risetech").join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.exists())
}

pub fn load_config(explicit: Option<&Path>) -> PortalResult<PortalConfig> {
    let mut figment = Figment::from(Serialized::defaults(PortalConfig::default()));
    if let Some(path) = config_path(explicit) {
        tracing::debug!(path = %path.display(), "reading config file");
        figment = figment.merge(Toml::file(path));
    }
    let config: PortalConfig = figment
        .merge(Env::prefixed("PORTAL_").split("__"))
        .extract()?;

    config.validate()?;
    Ok(config)
}
