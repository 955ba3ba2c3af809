//! Static route table.
//!
//! Auth-entry pages are public and sit outside the gated subtree; everything
//! else declares the roles allowed to see it. The table is consulted once per
//! request by the access middleware.

use serde::Serialize;

use crate::role::Role;

pub const USER_OR_ADMIN: &[Role] = &[Role::User, Role::Admin];
pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Login,
    Register,
    VerifyEmail,
    PasswordReset,
    UserHome,
    AddProject,
    AdminDashboard,
    AdminTeachers,
    NotFound,
}

impl Page {
    pub fn title(&self) -> &'static str {
        match self {
            Page::Login => "Sign In",
            Page::Register => "Create Account",
            Page::VerifyEmail => "Verify Email",
            Page::PasswordReset => "Reset Password",
            Page::UserHome => "Home",
            Page::AddProject => "Add New Project",
            Page::AdminDashboard => "Admin Dashboard",
            Page::AdminTeachers => "Teacher Management",
            Page::NotFound => "404 Not Found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Auth-entry page, mounted outside the gated subtree.
    Public,
    Roles(&'static [Role]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSpec {
    pub path: &'static str,
    pub access: Access,
    pub page: Page,
}

pub static ROUTES: &[RouteSpec] = &[
    RouteSpec { path: "/login", access: Access::Public, page: Page::Login },
    RouteSpec { path: "/register", access: Access::Public, page: Page::Register },
    RouteSpec { path: "/verify-email", access: Access::Public, page: Page::VerifyEmail },
    RouteSpec { path: "/password-reset", access: Access::Public, page: Page::PasswordReset },
    RouteSpec { path: "/user", access: Access::Roles(USER_OR_ADMIN), page: Page::UserHome },
    RouteSpec { path: "/project", access: Access::Roles(USER_OR_ADMIN), page: Page::AddProject },
    RouteSpec { path: "/admin", access: Access::Roles(ADMIN_ONLY), page: Page::AdminDashboard },
    RouteSpec { path: "/admin/teachers", access: Access::Roles(ADMIN_ONLY), page: Page::AdminTeachers },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    /// `/` has no page of its own and redirects to login.
    Root,
    Route(&'static RouteSpec),
    NotFound,
}

/// Exact-path lookup, matching what the router mounts: `/admin/` is not
/// `/admin`.
pub fn lookup(path: &str) -> RouteMatch {
    if path == "/" {
        return RouteMatch::Root;
    }
    ROUTES
        .iter()
        .find(|route| route.path == path)
        .map_or(RouteMatch::NotFound, RouteMatch::Route)
}

pub fn public_routes() -> impl Iterator<Item = &'static RouteSpec> {
    ROUTES.iter().filter(|r| r.access == Access::Public)
}

pub fn protected_routes() -> impl Iterator<Item = &'static RouteSpec> {
    ROUTES.iter().filter(|r| r.access != Access::Public)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub text: &'static str,
    pub path: &'static str,
}

const ADMIN_MENU: &[MenuItem] = &[
    MenuItem { text: "Dashboard", path: "/admin" },
    MenuItem { text: "Manage Teachers", path: "/admin/teachers" },
];

const USER_MENU: &[MenuItem] = &[MenuItem { text: "Home", path: "/user" }];

/// Sidebar entries of the authenticated layout.
pub fn menu_for(role: Option<Role>) -> &'static [MenuItem] {
    match role {
        Some(Role::Admin) => ADMIN_MENU,
        Some(Role::User) | Some(Role::Unknown) | None => USER_MENU,
    }
}
