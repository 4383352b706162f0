//! HTTP handlers for the file-manager connector endpoint.
//!
//! The same handler logic serves `/connector`, `/connector/{optionset}` and
//! `/connector/{optionset}/{start_path}`; the bare route uses the `default` option set and
//! start path.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{Method, header},
    response::Response,
};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    config::DEFAULT_OPTION_SET,
    connector::{
        backend::{
            CommandResult, Connector, RequestInfo, UPLOAD_COMMAND,
            messages::{ERROR_UPLOAD, ERROR_UPLOAD_TOTAL_SIZE},
        },
        options::{DEFAULT_START_PATH, get_optionset_for_user},
        params::{RequestParams, collect_args, get_command},
        response::render_to_response,
    },
    errors::{Error, Result},
};

/// Which option set a connector request is for, taken from the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorTarget {
    pub optionset: String,
    pub start_path: String,
}

impl Default for ConnectorTarget {
    fn default() -> Self {
        Self {
            optionset: DEFAULT_OPTION_SET.to_string(),
            start_path: DEFAULT_START_PATH.to_string(),
        }
    }
}

#[instrument(skip_all, fields(user = %user.username))]
pub async fn connector(State(state): State<AppState>, user: CurrentUser, request: Request) -> Result<Response> {
    dispatch(state, user, ConnectorTarget::default(), request).await
}

#[instrument(skip_all, fields(user = %user.username, optionset = %optionset))]
pub async fn connector_for_optionset(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(optionset): Path<String>,
    request: Request,
) -> Result<Response> {
    let target = ConnectorTarget {
        optionset,
        ..Default::default()
    };
    dispatch(state, user, target, request).await
}

#[instrument(skip_all, fields(user = %user.username, optionset = %optionset, start_path = %start_path))]
pub async fn connector_with_start_path(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((optionset, start_path)): Path<(String, String)>,
    request: Request,
) -> Result<Response> {
    dispatch(state, user, ConnectorTarget { optionset, start_path }, request).await
}

/// Check the option set exists, then hand over to the method's handler. Authentication has
/// already happened in the `CurrentUser` extractor.
async fn dispatch(state: AppState, user: CurrentUser, target: ConnectorTarget, request: Request) -> Result<Response> {
    let Some(optionset_config) = state.config.option_sets.get(&target.optionset) else {
        return Err(Error::NotFound {
            resource: "Option set".to_string(),
            id: target.optionset,
        });
    };
    let debug = optionset_config.debug;

    let method = request.method().clone();
    match method {
        Method::GET => get(&state, user, &target, debug, request).await,
        Method::POST => post(&state, user, &target, debug, request).await,
        other => Err(Error::MethodNotAllowed { method: other.to_string() }),
    }
}

async fn build_connector(state: &AppState, user: &CurrentUser, target: &ConnectorTarget, debug: bool) -> Result<Arc<dyn Connector>> {
    let mut options = get_optionset_for_user(&state.config, state.directory.as_ref(), state.roots.as_ref(), user, debug).await;
    options.apply_start_path(&target.start_path);
    state.connectors.connector(options, user).map_err(Error::Other)
}

fn request_info(request: &Request, user: CurrentUser) -> RequestInfo {
    RequestInfo {
        method: request.method().clone(),
        uri: request.uri().clone(),
        headers: request.headers().clone(),
        user,
    }
}

async fn get(state: &AppState, user: CurrentUser, target: &ConnectorTarget, debug: bool, request: Request) -> Result<Response> {
    let connector = build_connector(state, &user, target, debug).await?;
    let params = RequestParams::from_query(request.uri().query());
    let info = request_info(&request, user);

    output(connector.as_ref(), &get_command(&params), &params, &info).await
}

/// POST only exists for uploads. Other commands get an upload error built for them, but the
/// command still runs and its own result is what the client sees.
async fn post(state: &AppState, user: CurrentUser, target: &ConnectorTarget, debug: bool, request: Request) -> Result<Response> {
    let connector = build_connector(state, &user, target, debug).await?;
    let info = request_info(&request, user);
    let params = read_form(state, request).await?;
    let cmd = get_command(&params);

    if cmd != UPLOAD_COMMAND {
        let _rejected = CommandResult::new(json!({
            "error": connector.error(&[ERROR_UPLOAD, ERROR_UPLOAD_TOTAL_SIZE]),
        }));
        warn!(cmd = %cmd, "Non-upload command sent over POST");
    }

    output(connector.as_ref(), &cmd, &params, &info).await
}

async fn read_form(state: &AppState, request: Request) -> Result<RequestParams> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state).await.map_err(|e| Error::BadRequest {
            message: format!("Invalid multipart request: {e}"),
        })?;
        RequestParams::from_multipart(multipart).await
    } else {
        let body = Bytes::from_request(request, state).await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read request body: {e}"),
        })?;
        Ok(RequestParams::from_urlencoded(&body))
    }
}

/// Run `cmd` with the arguments the backend asks for and render the result.
async fn output(connector: &dyn Connector, cmd: &str, params: &RequestParams, info: &RequestInfo) -> Result<Response> {
    let declared = connector.command_args(cmd);
    let args = collect_args(&declared, params, info);
    debug!(cmd = %cmd, args = ?args.keys().collect::<Vec<_>>(), "Executing connector command");

    let result = connector.execute(cmd, args).await.map_err(Error::Other)?;

    // Reading a file pointer is blocking I/O
    tokio::task::spawn_blocking(move || render_to_response(result))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("render connector response: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use crate::{
        connector::{
            FilePointer,
            backend::{ArgValue, CommandResult},
        },
        test_utils::{FakeConnector, RecordingVolume, create_test_config, create_test_server, session_cookie, test_user},
    };
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::{Value, json};
    use std::{io::Cursor, sync::Arc};

    fn cookie_for(name: &str) -> (String, String) {
        ("cookie".to_string(), session_cookie(&test_user(name), &create_test_config()))
    }

    #[tokio::test]
    async fn test_connector_requires_authentication() {
        let (server, connector, _) = create_test_server(create_test_config(), FakeConnector::default());

        server.get("/connector").await.assert_status(StatusCode::FORBIDDEN);
        server.post("/connector").await.assert_status(StatusCode::FORBIDDEN);
        server.get("/connector/default").await.assert_status(StatusCode::FORBIDDEN);

        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_optionset_is_not_found() {
        let (server, connector, _) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("alice");

        server
            .get("/connector/nope")
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .post("/connector/nope/reports")
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::NOT_FOUND);

        assert!(connector.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_without_cmd_runs_open() {
        let connector = FakeConnector::default().with_args("open", &["target", "init", "tree"]);
        let (server, connector, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        let response = server
            .get("/connector")
            .add_query_param("init", "1")
            .add_query_param("target", " l1_Lw ")
            .add_header(&name, &value)
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["cmd"], "open");

        let calls = connector.calls();
        assert_eq!(calls.len(), 1);
        let (cmd, args) = &calls[0];
        assert_eq!(cmd, "open");
        assert_eq!(args["target"].as_text(), Some("l1_Lw"));
        assert_eq!(args["init"].as_text(), Some("1"));
        assert!(!args.contains_key("tree"));
        assert!(matches!(args["debug"], ArgValue::Flag(false)));
    }

    #[tokio::test]
    async fn test_get_passes_non_utf8_query_value_as_bytes() {
        let connector = FakeConnector::default().with_args("ls", &["target"]);
        let (server, connector, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        server
            .get("/connector?cmd=ls&target=%FF%FE")
            .add_header(&name, &value)
            .await
            .assert_status_ok();

        match &connector.calls()[0].1["target"] {
            ArgValue::Bytes(bytes) => assert_eq!(bytes.as_ref(), &[0xff, 0xfe]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_builds_connector_from_user_optionset() {
        let (server, _, factory) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("alice");

        server.get("/connector").add_header(&name, &value).await.assert_status_ok();

        let options = factory.last_options().unwrap();
        let ids: Vec<_> = options.roots.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["Board", "Web", "internal", "public"]);
        assert!(options.roots.iter().all(|r| r.start_path.is_none()));
        assert_eq!(factory.last_user().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_start_path_route_sets_start_path() {
        let (server, _, factory) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("carol");

        server
            .get("/connector/default/reports")
            .add_header(&name, &value)
            .await
            .assert_status_ok();

        let options = factory.last_options().unwrap();
        assert!(options.roots.iter().all(|r| r.start_path.as_deref() == Some("reports")));
    }

    #[tokio::test]
    async fn test_named_optionset_debug_flag() {
        let (server, _, factory) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("alice");

        server.get("/connector/archive").add_header(&name, &value).await.assert_status_ok();

        assert!(factory.last_options().unwrap().debug);
    }

    #[tokio::test]
    async fn test_get_streams_file_and_closes_volume() {
        let volume = Arc::new(RecordingVolume::default());
        let file_volume = volume.clone();
        let connector = FakeConnector::default()
            .with_args("file", &["target", "download"])
            .with_handler(move |_, args| {
                let hash = args["target"].as_text().unwrap_or_default().to_string();
                let pointer = FilePointer::new(Box::new(Cursor::new(b"filedata".to_vec())), file_volume.clone(), hash);
                CommandResult::file(pointer)
                    .with_header("Content-Type", "application/octet-stream")
                    .with_header("Content-Disposition", "attachment; filename=\"notes.txt\"")
            });
        let (server, _, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        let response = server
            .get("/connector")
            .add_query_param("cmd", "file")
            .add_query_param("target", "l1_bm90ZXM")
            .add_header(&name, &value)
            .await;

        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"filedata");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"notes.txt\""
        );
        assert_eq!(volume.closed_hashes(), vec!["l1_bm90ZXM".to_string()]);
    }

    #[tokio::test]
    async fn test_get_raw_error_passthrough() {
        let connector = FakeConnector::default().with_handler(|_, _| CommandResult::raw_error(json!(["errUnknownCmd"])));
        let (server, _, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        let response = server
            .get("/connector")
            .add_query_param("cmd", "bogus")
            .add_header(&name, &value)
            .await;

        response.assert_status_ok();
        assert_eq!(response.text(), "errUnknownCmd");
    }

    #[tokio::test]
    async fn test_post_upload_with_files_and_paths() {
        let connector = FakeConnector::default().with_args("upload", &["target", "FILES", "upload_path", "request"]);
        let (server, connector, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        let form = MultipartForm::new()
            .add_text("cmd", "upload")
            .add_text("target", "l1_Lw")
            .add_text("upload_path[]", "l1_a")
            .add_text("upload_path[]", "l1_b")
            .add_part("upload[]", Part::bytes(b"hello".as_slice()).file_name("hello.txt").mime_type("text/plain"));

        let response = server.post("/connector").multipart(form).add_header(&name, &value).await;
        response.assert_status_ok();

        let calls = connector.calls();
        let (cmd, args) = &calls[0];
        assert_eq!(cmd, "upload");
        assert_eq!(args["target"].as_text(), Some("l1_Lw"));
        match &args["upload_path"] {
            ArgValue::List(paths) => assert_eq!(paths, &vec!["l1_a".to_string(), "l1_b".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        match &args["FILES"] {
            ArgValue::Files(files) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].field, "upload[]");
                assert_eq!(files[0].file_name, "hello.txt");
                assert_eq!(files[0].data.as_ref(), b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &args["request"] {
            ArgValue::Request(req) => {
                assert_eq!(req.method, axum::http::Method::POST);
                assert_eq!(req.user.username, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_non_upload_still_executes() {
        let connector = FakeConnector::default().with_args("rm", &["targets"]);
        let (server, connector, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        let response = server
            .post("/connector")
            .form(&[("cmd", "rm"), ("targets[]", "l1_a"), ("targets[]", "l1_b")])
            .add_header(&name, &value)
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["cmd"], "rm");
        assert!(body.get("error").is_none());

        let calls = connector.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0].1["targets"] {
            ArgValue::List(targets) => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(connector.errors_built(), 1);
    }

    #[tokio::test]
    async fn test_post_reads_form_not_query() {
        let (server, connector, _) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("alice");

        server
            .post("/connector")
            .add_query_param("cmd", "rm")
            .form(&[("cmd", "upload")])
            .add_header(&name, &value)
            .await
            .assert_status_ok();

        assert_eq!(connector.calls()[0].0, "upload");
        assert_eq!(connector.errors_built(), 0);
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let (server, _, _) = create_test_server(create_test_config(), FakeConnector::default());
        let (name, value) = cookie_for("alice");

        server
            .put("/connector")
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_backend_failure_is_internal_error() {
        let connector = FakeConnector::default().failing();
        let (server, _, _) = create_test_server(create_test_config(), connector);
        let (name, value) = cookie_for("alice");

        server
            .get("/connector")
            .add_header(&name, &value)
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }
}
