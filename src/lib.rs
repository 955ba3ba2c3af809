//! Library root for the `risetech_portal` crate

// Core error handling
pub mod api_errors;
pub mod errors;

// Identity & profiles
pub mod identity;
pub mod identity_toolkit;
pub mod profile_store;
pub mod role;

// Session state
pub mod navigation;
pub mod session_context;
pub mod session_resolver;

// Access control
pub mod access_gate;
pub mod routes;

// Configuration & CLI
pub mod cli;
pub mod config_loader;

// Web server interface
pub mod app_state;
pub mod web;


pub use access_gate::{authorize, AccessPolicy, GateDecision};
pub use errors::{PortalError, PortalResult};
pub use role::Role;
pub use session_context::{Session, SessionContext, SessionState};
