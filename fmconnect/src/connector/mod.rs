//! The adapter between HTTP and the file-manager backend.
//!
//! - [`backend`]: traits the backend implements and the types crossing the seam
//! - [`options`]: which roots a user's option set contains
//! - [`params`]: collecting declared command arguments from the request
//! - [`response`]: turning a command result into an HTTP response

pub mod backend;
pub mod options;
pub mod params;
pub mod response;

pub use backend::{
    ArgValue, CommandArgs, CommandResult, Connector, ConnectorFactory, FilePointer, FileStream, RequestInfo, UploadedFile, Volume,
};
pub use options::{CandidateRoots, OptionSet, Root, RootsProvider};
