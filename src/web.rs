use axum::{
    extract::{Extension, Query, Request, State},
    http::{header, HeaderMap, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    access_gate::{authorize, GateDecision},
    api_errors::AppError,
    app_state::AppState,
    routes::{self, Access, MenuItem, Page, RouteMatch, RouteSpec},
    session_context::{Session, SessionState},
};

#[derive(Debug, Serialize)]
pub struct PageView {
    page: Page,
    title: &'static str,
    path: String,
    session: Option<Session>,
    menu: &'static [MenuItem],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    from: Option<String>,
}

/// Cookie carrying the id token issued at login.
pub const TOKEN_COOKIE: &str = "portal_token";

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn token_cookie(token: &str) -> String {
    format!("{TOKEN_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/")
}

fn cleared_token_cookie() -> String {
    format!("{TOKEN_COOKIE}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict; Path=/")
}

/// Whether the request carries the id token of the signed-in identity.
async fn holds_current_token(st: &AppState, headers: &HeaderMap) -> bool {
    match (st.identity.id_token().await, parse_cookie(headers, TOKEN_COOKIE)) {
        (Some(current), Some(presented)) => current == presented,
        _ => false,
    }
}

/// The shared session as this caller may see it. Only the client holding the
/// current id token sees the signed-in session; everyone else is anonymous.
async fn caller_state(st: &AppState, headers: &HeaderMap) -> SessionState {
    let state = st.session.current();
    if holds_current_token(st, headers).await {
        return state;
    }
    match state {
        SessionState::Ready(session) if session.is_authenticated => {
            SessionState::Ready(Session::anonymous(session.generation))
        }
        SessionState::Resolving if st.identity.current_identity().is_some() => {
            SessionState::Ready(Session::anonymous(0))
        }
        other => other,
    }
}

/// Build the portal router: auth-entry pages outside the gate, role-gated
/// pages behind it, plus session and health endpoints.
pub fn build_portal_router(state: Arc<AppState>) -> Router {
    let mut public = Router::new();
    for route in routes::public_routes() {
        let handler = if route.page == Page::Login {
            get(public_page).post(login)
        } else {
            get(public_page)
        };
        public = public.route(route.path, handler);
    }

    let mut gated = Router::new();
    for route in routes::protected_routes() {
        gated = gated.route(route.path, get(protected_page));
    }
    let gated = gated.route_layer(middleware::from_fn_with_state(state.clone(), access_gate));

    Router::new()
        .route("/", get(root))
        .merge(public)
        .merge(gated)
        .route("/logout", post(logout))
        .route("/api/session", get(session_state))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Evaluate the access gate for the requested route.
async fn access_gate(State(st): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let route = match routes::lookup(req.uri().path()) {
        RouteMatch::Route(route) => route,
        RouteMatch::Root | RouteMatch::NotFound => return not_found_view(req.uri().path()),
    };
    let allowed = match route.access {
        Access::Roles(roles) => roles,
        Access::Public => return next.run(req).await,
    };

    let requested = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| route.path.to_string());
    let state = caller_state(&st, req.headers()).await;
    let decision = authorize(&state, allowed, &st.policy, &requested);
    tracing::debug!(path = route.path, ?decision, "access gate");

    match decision {
        GateDecision::Suspend => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
        )
            .into_response(),
        GateDecision::Permit => {
            if let Some(session) = state.session() {
                req.extensions_mut().insert(session.clone());
            }
            req.extensions_mut().insert(route);
            next.run(req).await
        }
        GateDecision::RedirectToLogin { .. } | GateDecision::RedirectToDefault { .. } => {
            match decision.location(&st.policy) {
                Some(location) => Redirect::to(&location).into_response(),
                None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
    }
}

async fn root(State(st): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&st.policy.login_route)
}

async fn public_page(State(st): State<Arc<AppState>>, headers: HeaderMap, uri: Uri) -> Response {
    match routes::lookup(uri.path()) {
        RouteMatch::Route(route) => Json(PageView {
            page: route.page,
            title: route.page.title(),
            path: route.path.to_string(),
            session: caller_state(&st, &headers).await.session().cloned(),
            menu: &[],
        })
        .into_response(),
        RouteMatch::Root | RouteMatch::NotFound => not_found_view(uri.path()),
    }
}

async fn protected_page(
    Extension(route): Extension<&'static RouteSpec>,
    Extension(session): Extension<Session>,
) -> Json<PageView> {
    let menu = routes::menu_for(session.role);
    Json(PageView {
        page: route.page,
        title: route.page.title(),
        path: route.path.to_string(),
        session: Some(session),
        menu,
    })
}

fn validate_login(req: &LoginRequest) -> Result<(), AppError> {
    let email = req.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !email.chars().any(char::is_whitespace);
    if !well_formed {
        return Err(AppError::bad_request("Invalid email address"));
    }
    if req.password.trim().is_empty() {
        return Err(AppError::bad_request("Password is required"));
    }
    Ok(())
}

/// Only local paths that the settled session may actually open are honoured
/// as post-login returns.
fn permitted_return(st: &AppState, session: &Session, from: Option<&str>) -> Option<String> {
    let from = from?;
    if !from.starts_with('/') || from.starts_with("//") {
        return None;
    }
    let path = from.split('?').next().unwrap_or(from);
    let RouteMatch::Route(RouteSpec {
        access: Access::Roles(allowed),
        ..
    }) = routes::lookup(path)
    else {
        return None;
    };
    let state = SessionState::Ready(session.clone());
    (authorize(&state, allowed, &st.policy, from) == GateDecision::Permit).then(|| from.to_string())
}

async fn login(
    State(st): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    validate_login(&req)?;

    // Anything still pending belongs to an earlier sign-in.
    st.navigation.take();
    let identity = st
        .identity
        .sign_in_with_password(&req.email, &req.password)
        .await?;

    let token = st
        .identity
        .id_token()
        .await
        .ok_or_else(|| AppError::Internal("identity provider issued no token".into()))?;
    let set_cookie = [(header::SET_COOKIE, token_cookie(&token))];

    if st.policy.require_verified_email && !identity.email_verified {
        tracing::info!(uid = %identity.id, "unverified sign-in; sending to verification");
        return Ok((set_cookie, Redirect::to(&st.policy.verify_email_route)).into_response());
    }

    let session = st
        .session
        .wait_for_identity(&identity.id, st.resolve_wait)
        .await?;
    // The forced navigation may land just after the publish we woke on; it
    // always names the role landing, so fall back to computing that.
    let forced = st.navigation.take();
    let target = permitted_return(&st, &session, query.from.as_deref())
        .or(forced)
        .unwrap_or_else(|| {
            if session.is_admin() {
                st.routes.admin_landing.clone()
            } else {
                st.routes.user_landing.clone()
            }
        });

    tracing::info!(uid = %identity.id, %target, "login complete");
    Ok((set_cookie, Redirect::to(&target)).into_response())
}

/// Sign out, but only on behalf of the client that signed in.
async fn logout(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    if holds_current_token(&st, &headers).await {
        st.identity.sign_out().await?;
    } else {
        tracing::debug!("logout without the current token; session left alone");
    }
    Ok((
        [(header::SET_COOKIE, cleared_token_cookie())],
        Redirect::to(&st.policy.login_route),
    )
        .into_response())
}

async fn session_state(State(st): State<Arc<AppState>>, headers: HeaderMap) -> Json<SessionState> {
    Json(caller_state(&st, &headers).await)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readyz(State(st): State<Arc<AppState>>) -> Response {
    let token = st.identity.id_token().await;
    let ready = st.profiles.test_connection(token.as_deref()).await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ "ready": ready }))).into_response()
}

async fn not_found(uri: Uri) -> Response {
    not_found_view(uri.path())
}

fn not_found_view(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(PageView {
            page: Page::NotFound,
            title: Page::NotFound.title(),
            path: path.to_string(),
            session: None,
            menu: &[],
        }),
    )
        .into_response()
}
