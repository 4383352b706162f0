//! The seam between the HTTP adapter and the file-manager backend.
//!
//! The backend owns command dispatch, path resolution and the volume drivers. The adapter only
//! knows three things about it: which argument names a command wants
//! ([`Connector::command_args`]), how to run a command ([`Connector::execute`]), and the shape
//! of what comes back ([`CommandResult`]).

use std::{
    collections::BTreeMap,
    fmt,
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
};

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::{api::models::users::CurrentUser, connector::options::OptionSet};

/// Error message identifiers understood by the file-manager client.
pub mod messages {
    pub const ERROR_UPLOAD: &str = "errUpload";
    pub const ERROR_UPLOAD_TOTAL_SIZE: &str = "errUploadTotalSize";
}

/// The only command accepted over POST.
pub const UPLOAD_COMMAND: &str = "upload";

/// A readable, rewindable file handle owned by a volume.
pub trait FileStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> FileStream for T {}

/// Storage volume that hands out file streams and must get them back.
pub trait Volume: Send + Sync {
    /// Release a stream previously opened for the file identified by `hash`.
    fn close(&self, stream: Box<dyn FileStream>, hash: &str);
}

/// An open file to be sent back as the response body.
///
/// The stream is handed back to its volume exactly once: after [`FilePointer::read_all`], or
/// when the pointer is dropped without being read.
pub struct FilePointer {
    stream: Option<Box<dyn FileStream>>,
    volume: Arc<dyn Volume>,
    hash: String,
}

impl FilePointer {
    pub fn new(stream: Box<dyn FileStream>, volume: Arc<dyn Volume>, hash: impl Into<String>) -> Self {
        Self {
            stream: Some(stream),
            volume,
            hash: hash.into(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Rewind the stream, read it to the end, then close it on its volume.
    pub fn read_all(mut self) -> io::Result<Vec<u8>> {
        let mut body = Vec::new();
        let read = match self.stream.as_mut() {
            Some(stream) => stream.seek(SeekFrom::Start(0)).and_then(|_| stream.read_to_end(&mut body)),
            None => Ok(0),
        };
        self.release();
        read.map(|_| body)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.volume.close(stream, &self.hash);
        }
    }
}

impl Drop for FilePointer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FilePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePointer")
            .field("hash", &self.hash)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

/// What a command execution produced.
///
/// `header` overrides the response content type, status and extra headers. When `pointer` is
/// set the file is the body and `context` is ignored. Otherwise `context` is serialized as JSON,
/// or written literally for raw errors and non-JSON content types.
#[derive(Debug, Default)]
pub struct CommandResult {
    pub header: Option<Map<String, Value>>,
    pub pointer: Option<FilePointer>,
    pub context: Value,
}

impl CommandResult {
    pub fn new(context: Value) -> Self {
        Self {
            header: None,
            pointer: None,
            context,
        }
    }

    /// A raw error: the payload becomes the response body as-is.
    pub fn raw_error(error: Value) -> Self {
        let mut context = Map::new();
        context.insert("raw".to_string(), Value::Bool(true));
        context.insert("error".to_string(), error);
        Self::new(Value::Object(context))
    }

    pub fn file(pointer: FilePointer) -> Self {
        Self {
            pointer: Some(pointer),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }
}

/// A file received in a multipart POST.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// Form field the file arrived under (e.g. `upload[]`)
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Snapshot of the HTTP request for commands that ask for it.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub user: CurrentUser,
}

/// A resolved command argument.
#[derive(Debug, Clone)]
pub enum ArgValue {
    /// A scalar parameter, whitespace-trimmed
    Text(String),
    /// A scalar parameter that was not valid UTF-8, passed through untouched
    Bytes(Bytes),
    /// A multi-valued parameter such as `targets[]`
    List(Vec<String>),
    Files(Vec<UploadedFile>),
    Request(Box<RequestInfo>),
    Flag(bool),
}

impl ArgValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

pub type CommandArgs = BTreeMap<String, ArgValue>;

/// A file-manager backend bound to one user's option set.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Argument names `cmd` expects; empty for commands the backend does not know.
    fn command_args(&self, cmd: &str) -> Vec<String>;

    /// Run `cmd`. Command-level failures belong in the returned context; `Err` is for the
    /// backend itself being unusable.
    async fn execute(&self, cmd: &str, args: CommandArgs) -> anyhow::Result<CommandResult>;

    /// Build the backend's error payload for the given message identifiers.
    fn error(&self, messages: &[&str]) -> Value;
}

/// Builds a connector per request from the user's option set.
pub trait ConnectorFactory: Send + Sync {
    fn connector(&self, options: OptionSet, user: &CurrentUser) -> anyhow::Result<Arc<dyn Connector>>;
}
