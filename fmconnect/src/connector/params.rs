//! Turning request parameters into command arguments.
//!
//! The backend declares argument names per command. Most names map to a single request
//! parameter of the same name, but a few are sourced differently; [`ArgSource::for_name`] is
//! the lookup table for those.

use axum::extract::Multipart;
use bytes::Bytes;
use percent_encoding::percent_decode;
use tracing::trace;

use crate::{
    connector::backend::{ArgValue, CommandArgs, RequestInfo, UploadedFile},
    errors::{Error, Result},
};

/// Command used when the request names none.
pub const DEFAULT_COMMAND: &str = "open";

/// Arguments backed by a multi-valued `name[]` parameter.
const LIST_PARAMS: &[(&str, &str)] = &[("upload_path", "upload_path[]"), ("targets", "targets[]")];

/// Query string or form parameters of one request, plus any uploaded files.
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    values: Vec<(String, Bytes)>,
    files: Vec<UploadedFile>,
}

impl RequestParams {
    pub fn from_query(query: Option<&str>) -> Self {
        Self::from_urlencoded(query.unwrap_or_default().as_bytes())
    }

    /// Parse `application/x-www-form-urlencoded` data. Values are decoded to raw bytes, so
    /// anything that is not UTF-8 survives until [`try_trim`] sees it.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let mut params = Self::default();
        for pair in body.split(|b| *b == b'&').filter(|pair| !pair.is_empty()) {
            let (name, value) = match pair.iter().position(|b| *b == b'=') {
                Some(eq) => (&pair[..eq], &pair[eq + 1..]),
                None => (pair, &[][..]),
            };
            let name = decode_component(name);
            params.push(String::from_utf8_lossy(&name).into_owned(), Bytes::from(decode_component(value)));
        }
        params
    }

    /// Read every field of a multipart body. Fields with a file name are uploads.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut params = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        })? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            let data = field.bytes().await.map_err(|e| Error::BadRequest {
                message: format!("Failed to read multipart field {name}: {e}"),
            })?;

            match file_name {
                Some(file_name) => {
                    trace!(field = %name, file_name = %file_name, size = data.len(), "Received upload");
                    params.files.push(UploadedFile {
                        field: name,
                        file_name,
                        content_type,
                        data,
                    });
                }
                None => params.push(name, data),
            }
        }

        Ok(params)
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.values.push((name.into(), value.into()));
    }

    pub fn push_file(&mut self, file: UploadedFile) {
        self.files.push(file);
    }

    /// The last value given for `name`.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.values.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Every value given for `name`, in request order.
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.values
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }
}

/// Percent-decode one form component, `+` meaning space.
fn decode_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect();
    percent_decode(&spaced).collect()
}

/// Where a declared argument's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSource<'a> {
    /// The request itself
    Request,
    /// Uploaded files
    Files,
    /// All values of a list parameter
    List(&'static str),
    /// A single parameter, looked up under this name
    Param(&'a str),
}

impl<'a> ArgSource<'a> {
    pub fn for_name(name: &'a str) -> Self {
        match name {
            "request" => ArgSource::Request,
            "FILES" => ArgSource::Files,
            _ => {
                if let Some((_, param)) = LIST_PARAMS.iter().find(|(arg, _)| *arg == name) {
                    return ArgSource::List(*param);
                }
                // `type_` and friends: backends suffix reserved words with one underscore
                ArgSource::Param(name.strip_suffix('_').unwrap_or(name))
            }
        }
    }
}

/// Trim a scalar parameter if it is text, otherwise hand over the raw bytes.
pub fn try_trim(raw: &Bytes) -> ArgValue {
    match std::str::from_utf8(raw) {
        Ok(text) => ArgValue::Text(text.trim().to_string()),
        Err(_) => ArgValue::Bytes(raw.clone()),
    }
}

/// The requested command, `open` when absent.
pub fn get_command(params: &RequestParams) -> String {
    params
        .get("cmd")
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .unwrap_or_else(|| DEFAULT_COMMAND.to_string())
}

/// Resolve the `declared` argument names against the request.
///
/// Single parameters missing from the request are left out. `debug` is always set: the
/// request's `debug` parameter if given, else `false`.
pub fn collect_args(declared: &[String], params: &RequestParams, request: &RequestInfo) -> CommandArgs {
    let mut args = CommandArgs::new();

    for name in declared {
        match ArgSource::for_name(name) {
            ArgSource::Request => {
                args.insert(name.clone(), ArgValue::Request(Box::new(request.clone())));
            }
            ArgSource::Files => {
                args.insert(name.clone(), ArgValue::Files(params.files().to_vec()));
            }
            ArgSource::List(param) => {
                args.insert(name.clone(), ArgValue::List(params.get_list(param)));
            }
            ArgSource::Param(param) => {
                if let Some(raw) = params.get(param) {
                    args.insert(name.clone(), try_trim(raw));
                }
            }
        }
    }

    let debug = match params.get("debug") {
        Some(raw) => ArgValue::Text(String::from_utf8_lossy(raw).into_owned()),
        None => ArgValue::Flag(false),
    };
    args.insert("debug".to_string(), debug);

    args
}
