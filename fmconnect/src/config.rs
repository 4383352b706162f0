//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `FMCONNECT_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FMCONNECT_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FMCONNECT_AUTH__PROXY_HEADER__ENABLED=true` sets the `auth.proxy_header.enabled` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Storage**: `media_root`, `media_url`, `upload_max_size` - where per-team roots live and
//!   how they are published
//! - **Option sets**: `option_sets` - the connector option sets that may be requested by name
//! - **Authentication**: `secret_key`, `auth.session`, `auth.proxy_header`
//! - **Directory**: `directory.users`, `directory.teams` - user and team membership data

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use crate::errors::Error;

/// Name of the option set served by the bare `/connector` route
pub const DEFAULT_OPTION_SET: &str = "default";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FMCONNECT_CONFIG", default_value = "config.yaml")]
    pub config: String,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret used to sign session tokens
    pub secret_key: Option<String>,
    /// Directory under which every root's files live (`<media_root>/<root name>`)
    pub media_root: PathBuf,
    /// Public URL prefix for media files, must end with `/`
    pub media_url: String,
    /// Upload size limit advertised on every root, in the backend's notation (e.g. `128m`)
    pub upload_max_size: String,
    /// Option sets that may be requested through the connector routes
    pub option_sets: BTreeMap<String, OptionSetConfig>,
    pub auth: AuthConfig,
    pub directory: DirectoryConfig,
}

/// Per option-set settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionSetConfig {
    /// Forwarded to the backend as the option set's `debug` flag
    pub debug: bool,
}

/// Authentication configuration for all supported auth methods.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub session: SessionConfig,
    pub proxy_header: ProxyHeaderAuthConfig,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// How long an issued session token stays valid
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for session token
    pub cookie_name: String,
}

/// Proxy header-based authentication configuration.
///
/// Reads the username from an HTTP header set by a trusted upstream proxy. The user must be
/// present in the directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyHeaderAuthConfig {
    pub enabled: bool,
    /// The name of the HTTP header carrying the username
    pub header_name: String,
}

/// Static user and team membership data.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoryConfig {
    pub users: Vec<DirectoryUserConfig>,
    /// Teams, in the order their roots are listed
    pub teams: Vec<TeamConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryUserConfig {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
    /// Slugs of the teams this user administers
    #[serde(default)]
    pub administers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TeamConfig {
    pub name: String,
    pub slug: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
            secret_key: None,
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            upload_max_size: "128m".to_string(),
            option_sets: BTreeMap::from([(DEFAULT_OPTION_SET.to_string(), OptionSetConfig::default())]),
            auth: AuthConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60), // 24 hours
            cookie_name: "fmconnect_session".to_string(),
        }
    }
}

impl Default for ProxyHeaderAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: "x-fmconnect-user".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the file named in `args`, with environment overrides, and validate it.
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // FMCONNECT_CONFIG names the file itself, it is not a config key
            .merge(Env::prefixed("FMCONNECT_").ignore(&["config"]).split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.is_none() {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                 Please set FMCONNECT_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        if !self.option_sets.contains_key(DEFAULT_OPTION_SET) {
            return Err(Error::Internal {
                operation: format!("Config validation: option_sets must contain a '{DEFAULT_OPTION_SET}' entry"),
            });
        }

        if !self.media_url.ends_with('/') {
            return Err(Error::Internal {
                operation: format!("Config validation: media_url '{}' must end with '/'", self.media_url),
            });
        }

        self.upload_limit_bytes()?;

        for user in &self.directory.users {
            for slug in &user.administers {
                if !self.directory.teams.iter().any(|t| &t.slug == slug) {
                    return Err(Error::Internal {
                        operation: format!("Config validation: user '{}' administers unknown team '{slug}'", user.username),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `upload_max_size` in bytes, used as the request body limit on the connector routes.
    pub fn upload_limit_bytes(&self) -> Result<usize, Error> {
        parse_size(&self.upload_max_size).ok_or_else(|| Error::Internal {
            operation: format!("Config validation: invalid upload_max_size '{}'", self.upload_max_size),
        })
    }
}

/// Parse a size like `128m`, `512K`, `1g` or a plain byte count.
fn parse_size(text: &str) -> Option<usize> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last()?.to_ascii_lowercase() {
        'k' => (&text[..text.len() - 1], 1024),
        'm' => (&text[..text.len() - 1], 1024 * 1024),
        'g' => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text, 1),
    };
    digits.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}
