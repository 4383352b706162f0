//! Authentication for the connector endpoints.
//!
//! Every connector and index route requires a logged-in user and nothing more: there is no
//! role or permission model at this layer. Access to individual roots is decided by which roots
//! end up in the user's option set, see [`crate::connector::options`].
//!
//! # Authentication Methods
//!
//! ## 1. Session Cookie
//!
//! A JWT signed with the configured `secret_key`, carried in the cookie named by
//! `auth.session.cookie_name`. Tokens are minted with [`session::create_session_token`] by
//! whatever login flow the embedding application runs.
//!
//! ## 2. Proxy Header
//!
//! When `auth.proxy_header.enabled` is set, a trusted upstream proxy may name the user in
//! `auth.proxy_header.header_name`. The user must exist in the [`crate::directory::Directory`].
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use fmconnect::api::models::users::CurrentUser;
//!
//! async fn protected_handler(user: CurrentUser) -> String {
//!     format!("Hello, {}!", user.username)
//! }
//! ```
//!
//! Requests without a valid session are rejected with `403 Forbidden`.

pub mod current_user;
pub mod session;
