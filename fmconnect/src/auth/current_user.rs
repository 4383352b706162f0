use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    config::Config,
    directory::Directory,
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, instrument, trace};

/// Extract user from JWT session cookie if present and valid.
///
/// The header is scanned as bytes: other cookies on the same origin may carry non-ASCII values,
/// which must not hide the session cookie.
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &Config) -> Option<CurrentUser> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;
    let cookie_name = config.auth.session.cookie_name.as_bytes();

    for cookie in cookie_header.as_bytes().split(|b| *b == b';') {
        let cookie = cookie.trim_ascii();
        let Some(eq) = cookie.iter().position(|b| *b == b'=') else {
            continue;
        };
        if &cookie[..eq] != cookie_name {
            continue;
        }
        let Ok(token) = std::str::from_utf8(&cookie[eq + 1..]) else {
            continue;
        };
        // Expired or forged tokens count as no session
        if let Ok(user) = session::verify_session_token(token, config) {
            return Some(user);
        }
    }
    None
}

/// Extract user from the trusted proxy header if enabled and the user is known
#[instrument(skip(parts, config, directory))]
async fn try_proxy_header_auth(parts: &Parts, config: &Config, directory: &dyn Directory) -> Option<CurrentUser> {
    if !config.auth.proxy_header.enabled {
        return None;
    }

    let username = parts
        .headers
        .get(&config.auth.proxy_header.header_name)
        .and_then(|h| h.to_str().ok())?;

    let user = directory.find_user(username).await;
    if user.is_none() {
        debug!("Proxy header named unknown user {}", username);
    }
    user
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(user) = try_jwt_session_auth(parts, &state.config) {
            trace!("Authenticated {} via session cookie", user.username);
            return Ok(user);
        }

        if let Some(user) = try_proxy_header_auth(parts, &state.config, state.directory.as_ref()).await {
            trace!("Authenticated {} via proxy header", user.username);
            return Ok(user);
        }

        Err(Error::PermissionDenied { message: None })
    }
}
