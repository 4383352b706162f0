//! Test utilities: a scriptable backend, a recording volume and a ready-made test config.

use std::{
    collections::{BTreeMap, HashMap},
    io::{Read, Seek, SeekFrom},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use axum_test::TestServer;
use serde_json::{Value, json};

use crate::{
    AppState, Application,
    api::models::users::CurrentUser,
    auth::session::create_session_token,
    config::{Config, DEFAULT_OPTION_SET, DirectoryConfig, DirectoryUserConfig, OptionSetConfig, TeamConfig},
    connector::{CommandArgs, CommandResult, Connector, ConnectorFactory, FileStream, OptionSet, RequestInfo, Volume},
    directory::ConfigDirectory,
};

pub fn create_test_config() -> Config {
    let user = |username: &str, is_superuser: bool, administers: &[&str]| DirectoryUserConfig {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        is_superuser,
        administers: administers.iter().map(|s| s.to_string()).collect(),
    };
    let team = |name: &str, slug: &str| TeamConfig {
        name: name.to_string(),
        slug: slug.to_string(),
    };

    let mut option_sets = BTreeMap::new();
    option_sets.insert(DEFAULT_OPTION_SET.to_string(), OptionSetConfig { debug: false });
    option_sets.insert("archive".to_string(), OptionSetConfig { debug: true });

    Config {
        secret_key: Some("test-secret-key-for-fmconnect".to_string()),
        option_sets,
        directory: DirectoryConfig {
            users: vec![
                user("alice", false, &["board", "web"]),
                user("root", true, &[]),
                user("carol", false, &[]),
            ],
            teams: vec![team("Board", "board"), team("Events", "events"), team("Web", "web")],
        },
        ..Default::default()
    }
}

/// The directory entry for `name` in [`create_test_config`], as an authenticated user.
pub fn test_user(name: &str) -> CurrentUser {
    CurrentUser {
        username: name.to_string(),
        email: format!("{name}@example.com"),
        is_superuser: name == "root",
    }
}

/// A `cookie` header value carrying a valid session for `user`.
pub fn session_cookie(user: &CurrentUser, config: &Config) -> String {
    let token = create_session_token(user, config).expect("Failed to create session token");
    format!("{}={}", config.auth.session.cookie_name, token)
}

pub fn request_info(user: CurrentUser) -> RequestInfo {
    RequestInfo {
        method: Method::GET,
        uri: Uri::from_static("/connector"),
        headers: HeaderMap::new(),
        user,
    }
}

/// Volume that remembers what was closed, in order: the hash, and the stream's full contents
/// plus its position at the moment it was handed back.
#[derive(Default)]
pub struct RecordingVolume {
    closed: Mutex<Vec<ClosedStream>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedStream {
    pub hash: String,
    pub position: u64,
    pub contents: Vec<u8>,
}

impl RecordingVolume {
    pub fn closed_hashes(&self) -> Vec<String> {
        self.closed.lock().unwrap().iter().map(|c| c.hash.clone()).collect()
    }

    pub fn closed_streams(&self) -> Vec<ClosedStream> {
        self.closed.lock().unwrap().clone()
    }
}

impl Volume for RecordingVolume {
    fn close(&self, mut stream: Box<dyn FileStream>, hash: &str) {
        let position = stream.stream_position().unwrap();
        let mut contents = Vec::new();
        stream.seek(SeekFrom::Start(0)).unwrap();
        stream.read_to_end(&mut contents).unwrap();
        self.closed.lock().unwrap().push(ClosedStream {
            hash: hash.to_string(),
            position,
            contents,
        });
    }
}

type Handler = Arc<dyn Fn(&str, &CommandArgs) -> CommandResult + Send + Sync>;

/// Backend double. Every command answers `{"cmd": <cmd>}` unless a handler is set.
pub struct FakeConnector {
    args: HashMap<String, Vec<String>>,
    handler: Handler,
    failing: bool,
    calls: Mutex<Vec<(String, CommandArgs)>>,
    errors_built: AtomicUsize,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            args: HashMap::new(),
            handler: Arc::new(|cmd: &str, _: &CommandArgs| CommandResult::new(json!({ "cmd": cmd }))),
            failing: false,
            calls: Mutex::new(Vec::new()),
            errors_built: AtomicUsize::new(0),
        }
    }
}

impl FakeConnector {
    /// Declare the argument names `cmd` takes.
    pub fn with_args(mut self, cmd: &str, names: &[&str]) -> Self {
        self.args.insert(cmd.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &CommandArgs) -> CommandResult + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Make every execution fail as if the backend were down.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, CommandArgs)> {
        self.calls.lock().unwrap().clone()
    }

    /// How many times [`Connector::error`] was called.
    pub fn errors_built(&self) -> usize {
        self.errors_built.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn command_args(&self, cmd: &str) -> Vec<String> {
        self.args.get(cmd).cloned().unwrap_or_default()
    }

    async fn execute(&self, cmd: &str, args: CommandArgs) -> anyhow::Result<CommandResult> {
        if self.failing {
            anyhow::bail!("backend unavailable");
        }
        let result = (self.handler)(cmd, &args);
        self.calls.lock().unwrap().push((cmd.to_string(), args));
        Ok(result)
    }

    fn error(&self, messages: &[&str]) -> Value {
        self.errors_built.fetch_add(1, Ordering::SeqCst);
        json!(messages)
    }
}

/// Hands out one shared [`FakeConnector`] and records what it was asked for.
pub struct FakeConnectorFactory {
    connector: Arc<FakeConnector>,
    last: Mutex<Option<(OptionSet, CurrentUser)>>,
}

impl FakeConnectorFactory {
    pub fn new(connector: FakeConnector) -> Self {
        Self {
            connector: Arc::new(connector),
            last: Mutex::new(None),
        }
    }

    pub fn connector_handle(&self) -> Arc<FakeConnector> {
        self.connector.clone()
    }

    pub fn last_options(&self) -> Option<OptionSet> {
        self.last.lock().unwrap().as_ref().map(|(options, _)| options.clone())
    }

    pub fn last_user(&self) -> Option<CurrentUser> {
        self.last.lock().unwrap().as_ref().map(|(_, user)| user.clone())
    }
}

impl ConnectorFactory for FakeConnectorFactory {
    fn connector(&self, options: OptionSet, user: &CurrentUser) -> anyhow::Result<Arc<dyn Connector>> {
        *self.last.lock().unwrap() = Some((options, user.clone()));
        Ok(self.connector.clone())
    }
}

pub fn create_test_state(config: Config) -> AppState {
    AppState::builder()
        .directory(Arc::new(ConfigDirectory::new(&config.directory)))
        .config(config)
        .connectors(Arc::new(FakeConnectorFactory::new(FakeConnector::default())))
        .build()
}

pub fn create_test_server(config: Config, connector: FakeConnector) -> (TestServer, Arc<FakeConnector>, Arc<FakeConnectorFactory>) {
    let factory = Arc::new(FakeConnectorFactory::new(connector));
    let app = Application::new(config, factory.clone()).expect("Failed to create application");
    (app.into_test_server(), factory.connector_handle(), factory)
}
