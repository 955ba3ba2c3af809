// src/tests/config.rs
use figment::Jail;
use std::io::Write;

use crate::config_loader::{load_config, IdentityBackend, PortalConfig, ProfileBackend};
use crate::errors::PortalError;

fn load(path: Option<&std::path::Path>) -> figment::error::Result<PortalConfig> {
    load_config(path).map_err(|e| figment::Error::from(e.to_string()))
}

#[test]
fn defaults_apply_without_a_file() {
    Jail::expect_with(|_jail| {
        let config = load(None)?;
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.resolve_wait_secs, 10);
        assert_eq!(config.routes.login, "/login");
        assert_eq!(config.routes.admin_landing, "/admin");
        assert!(config.access.require_verified_email);
        assert_eq!(config.access.admin_email_domain, None);
        assert_eq!(config.profile_store.backend, ProfileBackend::Memory);
        assert_eq!(config.profile_store.database_id, "dawood");
        assert_eq!(config.identity.backend, IdentityBackend::Local);
        Ok(())
    });
}

#[test]
fn explicit_toml_file_is_read() {
    Jail::expect_with(|_jail| {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let path = dir.path().join("portal.toml");
        let mut file = std::fs::File::create(&path).map_err(|e| e.to_string())?;
        writeln!(
            file,
            r#"
[server]
port = 9090

[access]
admin_email_domain = "admin.com"

[[profile_store.profiles]]
uid = "u1"
name = "Ada"
role = "admin"

[[identity.local_accounts]]
id = "u1"
email = "ada@example.com"
password = "secret1"
"#
        )
        .map_err(|e| e.to_string())?;

        let config = load(Some(&path))?;
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.access.admin_email_domain.as_deref(), Some("admin.com"));
        assert_eq!(config.profile_store.profiles.len(), 1);
        assert_eq!(config.identity.local_accounts[0].email, "ada@example.com");
        assert!(config.identity.local_accounts[0].email_verified);
        Ok(())
    });
}

#[test]
fn env_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("portal.toml", "[server]\nport = 9090\n")?;
        jail.set_env("PORTAL_SERVER__PORT", "7000");
        jail.set_env("PORTAL_ACCESS__REQUIRE_VERIFIED_EMAIL", "false");

        let config = load(None)?;
        assert_eq!(config.server.port, 7000);
        assert!(!config.access.require_verified_email);
        Ok(())
    });
}

#[test]
fn firestore_backend_requires_project() {
    Jail::expect_with(|jail| {
        jail.create_file("portal.toml", "[profile_store]\nbackend = \"firestore\"\n")?;
        match load_config(None) {
            Err(PortalError::Validation { field, .. }) => {
                assert_eq!(field, "profile_store.project_id")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        Ok(())
    });
}

#[test]
fn identity_toolkit_requires_api_key() {
    let mut config = PortalConfig::default();
    config.identity.backend = IdentityBackend::IdentityToolkit;
    assert!(matches!(
        config.validate(),
        Err(PortalError::Validation { field, .. }) if field == "identity.api_key"
    ));

    config.identity.api_key = Some("key".into());
    assert!(config.validate().is_ok());
}

#[test]
fn route_paths_must_be_absolute() {
    let mut config = PortalConfig::default();
    config.routes.user_landing = "user".into();
    assert!(config.validate().is_err());
}
