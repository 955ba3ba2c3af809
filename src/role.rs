use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Application role sourced from the profile store.
///
/// Role strings come from an external document, so anything that is not a
/// known role parses to `Unknown` instead of failing. `Unknown` never appears
/// in a route's allowed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Unknown,
}

impl Role {
    /// Infallible parse used for profile documents.
    pub fn parse(raw: &str) -> Role {
        raw.parse().unwrap_or(Role::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Unknown => "unknown",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(input: &str) -> Result<Role, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
