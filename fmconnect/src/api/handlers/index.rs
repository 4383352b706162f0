//! HTTP handler for the file-manager page.

use axum::{http::HeaderMap, response::Html};
use minijinja::context;
use tracing::instrument;

use crate::{
    api::models::users::CurrentUser,
    errors::Result,
    templates::{self, INDEX, INDEX_PARTIAL},
};

/// Whether the request came from an in-page asynchronous fetch.
fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest")
}

/// Serve the file-manager page, or just its fragment for in-page fetches.
#[instrument(skip_all, fields(user = %user.username))]
pub async fn index(user: CurrentUser, headers: HeaderMap) -> Result<Html<String>> {
    let template = if is_ajax(&headers) { INDEX_PARTIAL } else { INDEX };
    let html = templates::render(
        template,
        context! {
            connector_url => "connector",
            username => user.username,
        },
    )?;
    Ok(Html(html))
}
