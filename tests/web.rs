// tests/web.rs
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use risetech_portal::app_state::AppState;
use risetech_portal::config_loader::{PortalConfig, SeedProfile};
use risetech_portal::identity::{
    Identity, IdentityProvider, LocalAccount, LocalIdentityProvider, SignInProvider,
};
use risetech_portal::profile_store::{InMemoryProfileStore, Profile, ProfileStore};
use risetech_portal::session_resolver::ResolverHandle;
use risetech_portal::web::{build_portal_router, LoginRequest, TOKEN_COOKIE};
use risetech_portal::{PortalResult, SessionState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for .oneshot()

fn account(id: &str, email: &str, verified: bool) -> LocalAccount {
    LocalAccount {
        id: id.into(),
        email: email.into(),
        password: "secret1".into(),
        display_name: None,
        email_verified: verified,
        provider: SignInProvider::Password,
    }
}

fn seed(uid: &str, name: &str, role: &str) -> SeedProfile {
    SeedProfile {
        uid: uid.into(),
        name: Some(name.into()),
        role: Some(role.into()),
    }
}

struct Portal {
    app: Router,
    state: Arc<AppState>,
    provider: Arc<LocalIdentityProvider>,
    _resolver: ResolverHandle,
}

async fn portal_with_store(profiles: Arc<dyn ProfileStore>) -> Portal {
    let mut config = PortalConfig::default();
    config.server.resolve_wait_secs = 2;
    let provider = Arc::new(LocalIdentityProvider::new(vec![
        account("admin-1", "head@school.org", true),
        account("user-1", "kid@school.org", true),
        account("new-1", "new@school.org", false),
    ]));
    let identity: Arc<dyn IdentityProvider> = provider.clone();
    let (state, resolver) = AppState::with_collaborators(&config, identity, profiles);
    state.session.settled().await.expect("initial session");

    Portal {
        app: build_portal_router(Arc::clone(&state)),
        state,
        provider,
        _resolver: resolver,
    }
}

async fn portal() -> Portal {
    let profiles = InMemoryProfileStore::seeded(&[
        seed("admin-1", "Head Teacher", "admin"),
        seed("user-1", "Kid", "user"),
    ]);
    portal_with_store(Arc::new(profiles)).await
}

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

/// GET as a client presenting `cookie` (a `name=value` pair), if any.
async fn get_as(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    send(app, req.body(Body::empty()).unwrap()).await
}

async fn get(app: &Router, uri: &str) -> Response<Body> {
    get_as(app, uri, None).await
}

async fn post_as(app: &Router, uri: &str, body: String, cookie: Option<&str>) -> Response<Body> {
    let mut req = Request::builder()
        .uri(uri)
        .method("POST")
        .header("Content-Type", "application/json");
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    send(app, req.body(Body::from(body)).unwrap()).await
}

async fn login_to(app: &Router, uri: &str, email: &str, password: &str) -> Response<Body> {
    let payload = LoginRequest {
        email: email.into(),
        password: password.into(),
    };
    post_as(app, uri, serde_json::to_string(&payload).unwrap(), None).await
}

async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
    login_to(app, "/login", email, password).await
}

/// Sign in and return the `name=value` cookie pair the browser would send back.
async fn signed_in(app: &Router, email: &str) -> (Response<Body>, String) {
    let response = login(app, email, "secret1").await;
    let cookie = token_pair(&response).expect("login sets the token cookie");
    (response, cookie)
}

fn token_pair(response: &Response<Body>) -> Option<String> {
    let set_cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = set_cookie.split(';').next()?.trim();
    pair.starts_with(&format!("{TOKEN_COOKIE}=")).then(|| pair.to_string())
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn wait_until_signed_out(portal: &Portal) {
    for _ in 0..200 {
        if portal.state.session.session().is_some_and(|s| !s.is_authenticated) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never signed out");
}

#[tokio::test]
async fn root_redirects_to_login() {
    let portal = portal().await;
    let response = get(&portal.app, "/").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn unknown_path_renders_not_found() {
    let portal = portal().await;
    let response = get(&portal.app, "/admin/students").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["page"], "not_found");
}

#[tokio::test]
async fn trailing_slash_is_not_found() {
    let portal = portal().await;
    let (_, cookie) = signed_in(&portal.app, "head@school.org").await;
    assert_eq!(get_as(&portal.app, "/admin", Some(&cookie)).await.status(), StatusCode::OK);

    let response = get_as(&portal.app, "/admin/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn auth_pages_are_public() {
    let portal = portal().await;
    for path in ["/login", "/register", "/verify-email", "/password-reset"] {
        let response = get(&portal.app, path).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn anonymous_request_is_sent_to_login_with_return_path() {
    let portal = portal().await;
    let response = get(&portal.app, "/admin/teachers").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?from=%2Fadmin%2Fteachers");
}

#[tokio::test]
async fn admin_login_lands_on_dashboard() {
    let portal = portal().await;
    let (response, cookie) = signed_in(&portal.app, "head@school.org").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin");

    let response = get_as(&portal.app, "/admin/teachers", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["page"], "admin_teachers");
    assert_eq!(body["session"]["role"], "admin");
    assert_eq!(body["session"]["display_name"], "Head Teacher");
    assert_eq!(body["menu"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn other_clients_do_not_inherit_the_session() {
    let portal = portal().await;
    let (_, cookie) = signed_in(&portal.app, "head@school.org").await;

    let response = get(&portal.app, "/admin/teachers").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?from=%2Fadmin%2Fteachers");

    let forged = format!("{TOKEN_COOKIE}=local-admin-1");
    let response = get_as(&portal.app, "/admin", Some(&forged)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let body = json_body(get(&portal.app, "/api/session").await).await;
    assert_eq!(body["is_authenticated"], false);
    assert!(body["email"].is_null());

    // A stranger's logout clears only its own cookie.
    let response = post_as(&portal.app, "/logout", String::new(), None).await;
    assert_eq!(location(&response), "/login");
    assert!(portal.provider.current_identity().is_some());
    let response = get_as(&portal.app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_is_kept_out_of_admin_pages() {
    let portal = portal().await;
    let (response, cookie) = signed_in(&portal.app, "kid@school.org").await;
    assert_eq!(location(&response), "/user");

    let response = get_as(&portal.app, "/project", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_as(&portal.app, "/admin", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let portal = portal().await;
    let response = login(&portal.app, "kid@school.org", "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(token_pair(&response).is_none());
    let body = json_body(response).await;
    assert_eq!(body["error"], "Incorrect password.");

    let response = login(&portal.app, "nobody@school.org", "secret1").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_login_is_a_bad_request() {
    let portal = portal().await;
    let response = login(&portal.app, "not-an-email", "secret1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = login(&portal.app, "kid@school.org", "  ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unverified_account_is_sent_to_verification() {
    let portal = portal().await;
    let (response, cookie) = signed_in(&portal.app, "new@school.org").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/verify-email");

    portal
        .state
        .session
        .wait_for_identity("new-1", Duration::from_secs(2))
        .await
        .unwrap();
    let response = get_as(&portal.app, "/user", Some(&cookie)).await;
    assert_eq!(location(&response), "/verify-email");
}

#[tokio::test]
async fn logout_returns_to_login_and_clears_session() {
    let portal = portal().await;
    let (_, cookie) = signed_in(&portal.app, "kid@school.org").await;

    let response = post_as(&portal.app, "/logout", String::new(), Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Expires=Thu, 01 Jan 1970"));

    wait_until_signed_out(&portal).await;
    assert!(portal.provider.current_identity().is_none());
    let response = get_as(&portal.app, "/user", Some(&cookie)).await;
    assert_eq!(location(&response), "/login?from=%2Fuser");
}

#[tokio::test]
async fn session_endpoint_reports_state() {
    let portal = portal().await;
    let body = json_body(get(&portal.app, "/api/session").await).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["is_authenticated"], false);

    let (_, cookie) = signed_in(&portal.app, "kid@school.org").await;
    let body = json_body(get_as(&portal.app, "/api/session", Some(&cookie)).await).await;
    assert_eq!(body["is_authenticated"], true);
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn health_and_readiness() {
    let portal = portal().await;
    assert_eq!(get(&portal.app, "/healthz").await.status(), StatusCode::OK);
    let response = get(&portal.app, "/readyz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ready"], true);
}

#[tokio::test]
async fn login_returns_to_requested_page_when_permitted() {
    let portal = portal().await;
    let response = login_to(&portal.app, "/login?from=%2Fproject", "kid@school.org", "secret1").await;
    assert_eq!(location(&response), "/project");
    let cookie = token_pair(&response).unwrap();

    post_as(&portal.app, "/logout", String::new(), Some(&cookie)).await;
    wait_until_signed_out(&portal).await;
    let response = login_to(
        &portal.app,
        "/login?from=%2Fadmin%2Fteachers",
        "kid@school.org",
        "secret1",
    )
    .await;
    assert_eq!(location(&response), "/user");
}

/// Store that never answers in time, to hold the session in `Resolving`.
struct StalledStore;

#[async_trait]
impl ProfileStore for StalledStore {
    async fn get_profile(&self, _id: &str, _bearer: Option<&str>) -> PortalResult<Option<Profile>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }

    async fn test_connection(&self, _bearer: Option<&str>) -> bool {
        false
    }
}

#[tokio::test]
async fn resolving_session_suspends_gated_pages() {
    let portal = portal_with_store(Arc::new(StalledStore)).await;
    portal
        .provider
        .emit(Some(Identity::new("user-1", "kid@school.org")));
    let token = portal.provider.id_token().await.unwrap();
    let cookie = format!("{TOKEN_COOKIE}={token}");

    for _ in 0..200 {
        if portal.state.session.current() == SessionState::Resolving {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(portal.state.session.current(), SessionState::Resolving);

    let response = get_as(&portal.app, "/user", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
        Some("1")
    );

    // Without the token there is nothing to wait for.
    let response = get(&portal.app, "/user").await;
    assert_eq!(location(&response), "/login?from=%2Fuser");

    let response = get(&portal.app, "/readyz").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
