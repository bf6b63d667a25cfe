//! OAuth callback: exchange the authorization code for a session cookie.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{cookie_value, ACCESS_TOKEN_COOKIE};
use crate::state::AppState;

/// Where failed sign-ins are sent.
pub const AUTH_ERROR_PATH: &str = "/auth/auth-code-error";

/// Cookie the client stores the PKCE verifier in before redirecting out.
pub const CODE_VERIFIER_COOKIE: &str = "code_verifier";

/// Session lifetime when the provider does not say.
const DEFAULT_SESSION_SECS: u64 = 3600;

/// Query parameters sent back by the auth provider.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
    pub code_verifier: Option<String>,
}

/// Build a `Set-Cookie` value for the access token. An empty `value` with
/// `max_age` 0 clears the cookie.
pub(crate) fn session_cookie(value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        ACCESS_TOKEN_COOKIE, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Only same-site absolute paths are followed; anything else goes home.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

/// Handle the provider redirect.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        warn!("Auth callback without a code");
        return Redirect::to(AUTH_ERROR_PATH).into_response();
    };

    let verifier = query
        .code_verifier
        .clone()
        .or_else(|| cookie_value(&headers, CODE_VERIFIER_COOKIE));

    let session = match state.auth.exchange_code(code, verifier.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Auth code exchange failed: {}", e);
            return Redirect::to(AUTH_ERROR_PATH).into_response();
        }
    };

    info!(user_id = %session.user.id, "User signed in");

    let secure = state.config.public_url.starts_with("https://");
    let cookie = session_cookie(
        &session.access_token,
        session.expires_in.unwrap_or(DEFAULT_SESSION_SECS),
        secure,
    );

    ([(SET_COOKIE, cookie)], Redirect::to(safe_next(query.next.as_deref()))).into_response()
}
