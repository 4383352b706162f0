//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: data structures shared by handlers and extractors
//!
//! # Routes
//!
//! - `GET /`: file-manager page
//! - `GET|POST /connector`: connector, `default` option set
//! - `GET|POST /connector/{optionset}`: connector for a named option set
//! - `GET|POST /connector/{optionset}/{start_path}`: as above, opening every root at `start_path`

pub mod handlers;
pub mod models;
