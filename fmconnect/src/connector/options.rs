//! Per-user option sets: which storage roots a user gets to see.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{api::models::users::CurrentUser, config::Config, directory::Directory};

pub const LOCAL_FILESYSTEM_DRIVER: &str = "LocalFileSystem";

/// Root every authenticated non-superuser gets after their team roots.
pub const INTERNAL_ROOT: &str = "internal";
/// Root everybody gets, always last.
pub const PUBLIC_ROOT: &str = "public";

/// Route value meaning "leave each root's start path alone".
pub const DEFAULT_START_PATH: &str = "default";

/// One storage root handed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Root {
    pub alias: String,
    pub id: String,
    pub driver: String,
    pub path: PathBuf,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "uploadMaxSize")]
    pub upload_max_size: String,
    #[serde(rename = "startPath", default, skip_serializing_if = "Option::is_none")]
    pub start_path: Option<String>,
}

/// Backend configuration for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionSet {
    pub debug: bool,
    pub roots: Vec<Root>,
}

impl OptionSet {
    /// Point every root at `start_path`, unless it is the `default` placeholder.
    pub fn apply_start_path(&mut self, start_path: &str) {
        if start_path == DEFAULT_START_PATH {
            return;
        }
        for root in &mut self.roots {
            root.start_path = Some(start_path.to_string());
        }
    }
}

/// Final say over a user's roots.
#[async_trait]
pub trait RootsProvider: Send + Sync {
    async fn roots_for_user(&self, user: &CurrentUser, candidates: Vec<Root>) -> Vec<Root>;
}

/// Accepts the team-derived roots unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateRoots;

#[async_trait]
impl RootsProvider for CandidateRoots {
    async fn roots_for_user(&self, _user: &CurrentUser, candidates: Vec<Root>) -> Vec<Root> {
        candidates
    }
}

pub fn root(config: &Config, name: &str) -> Root {
    Root {
        alias: name.to_string(),
        id: name.to_string(),
        driver: LOCAL_FILESYSTEM_DRIVER.to_string(),
        path: config.media_root.join(name),
        url: format!("{}{}/", config.media_url, name),
        upload_max_size: config.upload_max_size.clone(),
        start_path: None,
    }
}

/// Build the option set for `user`.
///
/// Superusers get a root per team (by slug); everybody else gets a root per team they
/// administer (by name) plus `internal`. `public` is always appended. The roots provider then
/// decides the final list.
#[instrument(skip(config, directory, roots, debug_flag), fields(user = %user.username, debug = debug_flag))]
pub async fn get_optionset_for_user(
    config: &Config,
    directory: &dyn Directory,
    roots: &dyn RootsProvider,
    user: &CurrentUser,
    debug_flag: bool,
) -> OptionSet {
    let mut candidates: Vec<Root> = if user.is_superuser {
        directory.all_teams().await.iter().map(|team| root(config, &team.slug)).collect()
    } else {
        let mut administered: Vec<Root> = directory
            .teams_administered(&user.username)
            .await
            .iter()
            .map(|team| root(config, &team.name))
            .collect();
        administered.push(root(config, INTERNAL_ROOT));
        administered
    };
    candidates.push(root(config, PUBLIC_ROOT));

    let roots = roots.roots_for_user(user, candidates).await;
    debug!(count = roots.len(), "Resolved roots");

    OptionSet { debug: debug_flag, roots }
}
