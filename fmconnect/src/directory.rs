//! User and team membership lookups.
//!
//! The connector only needs three questions answered about users: does this user exist, which
//! teams exist, and which teams does this user administer. [`Directory`] is the seam for
//! whatever system of record holds that data; [`ConfigDirectory`] answers from the `directory`
//! section of the configuration.

use async_trait::async_trait;

use crate::{
    api::models::users::CurrentUser,
    config::{DirectoryConfig, DirectoryUserConfig},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub slug: String,
}

/// Membership provider consulted when authenticating and when building option sets.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a known user by username
    async fn find_user(&self, username: &str) -> Option<CurrentUser>;

    /// Every team, in listing order
    async fn all_teams(&self) -> Vec<Team>;

    /// Teams administered by `username`, in listing order
    async fn teams_administered(&self, username: &str) -> Vec<Team>;
}

/// Directory backed by static configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigDirectory {
    users: Vec<DirectoryUserConfig>,
    teams: Vec<Team>,
}

impl ConfigDirectory {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            users: config.users.clone(),
            teams: config
                .teams
                .iter()
                .map(|t| Team {
                    name: t.name.clone(),
                    slug: t.slug.clone(),
                })
                .collect(),
        }
    }

    fn user(&self, username: &str) -> Option<&DirectoryUserConfig> {
        self.users.iter().find(|u| u.username == username)
    }
}

#[async_trait]
impl Directory for ConfigDirectory {
    async fn find_user(&self, username: &str) -> Option<CurrentUser> {
        self.user(username).map(|u| CurrentUser {
            username: u.username.clone(),
            email: u.email.clone(),
            is_superuser: u.is_superuser,
        })
    }

    async fn all_teams(&self) -> Vec<Team> {
        self.teams.clone()
    }

    async fn teams_administered(&self, username: &str) -> Vec<Team> {
        let Some(user) = self.user(username) else {
            return Vec::new();
        };
        // Team order, not the order the user lists them in
        self.teams
            .iter()
            .filter(|t| user.administers.contains(&t.slug))
            .cloned()
            .collect()
    }
}
