//! # fmconnect: HTTP gateway for a web file manager
//!
//! `fmconnect` sits between a browser-based file manager and the backend that actually does
//! the file work. It authenticates the session, turns the request's parameters into a command
//! invocation against the backend, and turns the backend's result back into an HTTP response:
//! JSON by default, raw file bytes for downloads, or a literal error payload.
//!
//! ## Overview
//!
//! The backend (command dispatch, path resolution, volume drivers) is not part of this crate.
//! It is plugged in through the traits in [`connector::backend`]:
//!
//! - a [`ConnectorFactory`] builds a [`Connector`] per request from the user's option set;
//! - the [`Connector`] declares which argument names each command takes and runs commands;
//! - a [`connector::Volume`] takes back file streams once their bytes have been sent.
//!
//! Which storage roots a user sees is computed from team memberships, provided by a
//! [`directory::Directory`], and finally vetted by a [`connector::RootsProvider`].
//!
//! ### Request Flow
//!
//! 1. The [`api::models::users::CurrentUser`] extractor authenticates the request (session
//!    cookie or trusted proxy header) and rejects it with 403 otherwise.
//! 2. The requested option set must be configured, else 404.
//! 3. The user's option set is built and handed to the connector factory.
//! 4. The command (`cmd`, default `open`) and its declared arguments are read from the query
//!    string (GET) or form body (POST), and the command is executed.
//! 5. The [`connector::CommandResult`] is rendered by [`connector::response::render_to_response`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use clap::Parser;
//! use fmconnect::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = fmconnect::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     fmconnect::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config, std::sync::Arc::new(MyBackend::default()))?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod connector;
pub mod directory;
pub mod errors;
pub mod telemetry;
mod templates;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{any, get},
};
use bon::Builder;
pub use config::Config;
pub use connector::{Connector, ConnectorFactory};
use connector::{CandidateRoots, RootsProvider};
use directory::{ConfigDirectory, Directory};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument};

use crate::api::handlers;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .directory(Arc::new(ConfigDirectory::new(&config.directory)))
///     .connectors(Arc::new(MyBackend::default()))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub directory: Arc<dyn Directory>,
    pub connectors: Arc<dyn ConnectorFactory>,
    #[builder(default = candidate_roots())]
    pub roots: Arc<dyn RootsProvider>,
}

fn candidate_roots() -> Arc<dyn RootsProvider> {
    Arc::new(CandidateRoots)
}

/// Build the application router with all routes and middleware.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.upload_limit_bytes()?;
    debug!(body_limit, "Connector body limit");

    let router = Router::new()
        .route("/", get(handlers::index::index))
        .route("/connector", any(handlers::connector::connector))
        .route("/connector/{optionset}", any(handlers::connector::connector_for_optionset))
        .route(
            "/connector/{optionset}/{start_path}",
            any(handlers::connector::connector_with_start_path),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    Ok(router)
}

/// Owns the router and configuration for the lifetime of the server.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] wires the configured directory and the given backend
/// 2. **Serve**: [`Application::serve`] binds to the configured address and handles requests
///    until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create an application backed by the config directory and `connectors`.
    pub fn new(config: Config, connectors: Arc<dyn ConnectorFactory>) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .config(config.clone())
            .directory(Arc::new(ConfigDirectory::new(&config.directory)))
            .connectors(connectors)
            .build();
        Self::from_state(state)
    }

    /// Create an application from fully assembled state, e.g. with a custom directory or
    /// roots provider.
    pub fn from_state(state: AppState) -> anyhow::Result<Self> {
        debug!("Starting connector with configuration: {:#?}", state.config);
        let config = state.config.clone();
        let router = build_router(state)?;
        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Connector listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Connector shut down");
        Ok(())
    }
}
