//! HTTP request handlers.
//!
//! - [`index`]: the file-manager page, full or partial
//! - [`connector`]: the connector endpoint the file-manager client talks to
//!
//! Both require an authenticated user, see [`crate::auth`]. Errors are returned as
//! [`crate::errors::Error`], which maps onto HTTP status codes.

pub mod connector;
pub mod index;
