//! Reverse proxy that puts the worker in front of one origin.
//!
//! Every incoming request is rebuilt against the configured origin and
//! offered to the worker. Requests the worker passes through go straight to
//! the network. Control messages arrive on [`CONTROL_PATH`].

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use dhikr_common::{DhikrError, Result, ResultExt};
use dhikr_net::{HttpNetwork, LoaderConfig};
use dhikr_sw::{
    DiskCacheStorage, FetchOutcome, HostCommand, Request, Response, ServiceWorker, SwError,
    WorkerState,
};
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;

/// Control messages are posted here.
pub const CONTROL_PATH: &str = "/__worker/message";

/// Request bodies larger than this are refused.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub type HostWorker = ServiceWorker<DiskCacheStorage, HttpNetwork>;

#[derive(Clone)]
pub struct AppState {
    worker: Arc<HostWorker>,
    network: Arc<HttpNetwork>,
}

impl AppState {
    /// Open the cache directory, install the configured worker and settle who
    /// is in control.
    ///
    /// When install fails, the worker activated by an earlier run stays in
    /// control from its stored namespace. Only with no such worker does the
    /// proxy fall back to forwarding everything to the origin.
    pub async fn start(config: &HostConfig) -> Result<Self> {
        let store = Arc::new(
            DiskCacheStorage::open(&config.cache_dir)
                .await
                .context("opening cache directory")?,
        );
        let network =
            Arc::new(HttpNetwork::new(LoaderConfig::default()).context("building HTTP client")?);
        let worker = ServiceWorker::new(config.worker.clone(), store.clone(), network.clone())
            .context("building worker")?;

        let worker = match boot(&worker).await {
            Ok(()) => worker,
            Err(e) => {
                error!(error = %e, namespace = %config.worker.namespace(), "Install failed");
                match ServiceWorker::restore(&config.worker, store, network.clone()).await {
                    Ok(Some(previous)) => {
                        info!(namespace = %previous.config().namespace(), "Previous worker stays in control");
                        previous
                    }
                    Ok(None) => {
                        warn!("No previous worker; forwarding straight to the origin");
                        worker
                    }
                    Err(e) => {
                        error!(error = %e, "Could not restore previous worker");
                        worker
                    }
                }
            }
        };

        Ok(Self {
            worker: Arc::new(worker),
            network,
        })
    }

    pub fn worker(&self) -> &HostWorker {
        &self.worker
    }
}

/// Install, then act on what the worker asks for.
pub async fn boot(worker: &HostWorker) -> std::result::Result<(), SwError> {
    let report = worker.on_install().await?;
    info!(
        namespace = %report.namespace,
        core = report.core_cached,
        optional = report.optional_cached,
        "Worker installed"
    );
    run_commands(worker, report.command).await;
    Ok(())
}

/// Translate worker commands into host actions.
pub async fn run_commands(worker: &HostWorker, first: HostCommand) {
    let mut next = Some(first);
    while let Some(command) = next.take() {
        match command {
            HostCommand::SkipWaiting => {
                if worker.state().await != WorkerState::Installed {
                    debug!("Skip waiting: no worker is waiting");
                    continue;
                }
                match worker.on_activate().await {
                    Ok(report) => {
                        info!(evicted = ?report.evicted, "Worker activated");
                        next = Some(report.command);
                    }
                    Err(e) => error!(error = %e, "Activation failed"),
                }
            }
            HostCommand::ClaimClients => {
                info!("Worker now controls all clients");
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CONTROL_PATH, post(control_message))
        .fallback(proxy)
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, origin = %state.worker.config().origin, "Proxy listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn proxy(State(state): State<AppState>, req: axum::extract::Request) -> axum::response::Response {
    match forward(&state, req).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, category = e.category(), "Proxy request failed");
            (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
        }
    }
}

async fn forward(state: &AppState, req: axum::extract::Request) -> Result<axum::response::Response> {
    let (parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state
        .worker
        .config()
        .origin
        .join(path_and_query)
        .map_err(|e| DhikrError::InvalidArgument(format!("{path_and_query}: {e}")))?;

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| DhikrError::network_with_source("reading request body", e))?;

    let mut request = Request::new(parts.method, url);
    request.headers = parts.headers;
    if !body.is_empty() {
        request.body = Some(body);
    }

    let response = match state.worker.on_fetch(request).await {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough(request) => state
            .network
            .send(&request)
            .await
            .map_err(|e| DhikrError::network_with_source("passthrough failed", e))?,
    };
    Ok(into_http(response))
}

fn into_http(mut response: Response) -> axum::response::Response {
    let status = response.status;
    let mut headers = std::mem::take(&mut response.headers);
    headers.remove(header::CONTENT_LENGTH);

    let mut out = axum::response::Response::new(Body::from(response.into_body()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}

async fn control_message(State(state): State<AppState>, body: Bytes) -> axum::response::Response {
    let message: JsonValue = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Control message is not JSON");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let (tx, rx) = oneshot::channel();
    if let Some(command) = state.worker.post_message(&message, tx).await {
        run_commands(&state.worker, command).await;
    }

    match rx.await {
        Ok(reply) => Json(reply).into_response(),
        Err(_) => {
            warn!(%message, "Control message got no reply");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhikr_sw::WorkerConfig;
    use serde_json::json;
    use std::net::SocketAddr;
    use url::Url;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A dedicated origin; dropping it really takes it offline.
    async fn origin_server() -> MockServer {
        let server = MockServer::builder().start().await;
        Mock::given(method("GET"))
            .and(path("/about.html"))
            .and(header_exists("if-none-match"))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .mount(&server)
            .await;
        for (asset, body) in [
            ("/", "<html>shell</html>"),
            ("/index.html", "<html>index</html>"),
            ("/about.html", "<html>about</html>"),
            ("/styles.css", "body {}"),
            ("/app.js", "let count = 0;"),
        ] {
            Mock::given(method("GET"))
                .and(path(asset))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/contact"))
            .respond_with(ResponseTemplate::new(201).set_body_string("sent"))
            .mount(&server)
            .await;
        server
    }

    async fn start_proxy(origin: &str, cache_dir: &std::path::Path) -> (SocketAddr, AppState) {
        let mut worker = WorkerConfig::new(Url::parse(origin).unwrap());
        worker.manifest.core = vec!["/".into(), "/index.html".into(), "/styles.css".into(), "/app.js".into()];
        worker.manifest.optional = vec![];
        worker.network_timeout_ms = 2_000;

        let config = HostConfig {
            listen: "127.0.0.1:0".into(),
            cache_dir: cache_dir.to_path_buf(),
            worker,
        };
        let state = AppState::start(&config).await.unwrap();

        let listener = TcpListener::bind(&config.listen).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state.clone()));
        (addr, state)
    }

    #[tokio::test]
    async fn test_boot_installs_and_activates() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let (_, state) = start_proxy(&server.uri(), dir.path()).await;

        assert_eq!(state.worker().state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_serves_from_cache_when_origin_is_gone() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let (addr, _state) = start_proxy(&server.uri(), dir.path()).await;
        drop(server);

        let client = reqwest::Client::new();
        let css = client
            .get(format!("http://{addr}/styles.css"))
            .send()
            .await
            .unwrap();
        assert_eq!(css.status(), 200);
        assert_eq!(css.text().await.unwrap(), "body {}");

        let page = client
            .get(format!("http://{addr}/history.html"))
            .send()
            .await
            .unwrap();
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_restart_with_origin_down_keeps_serving() {
        let server = origin_server().await;
        let origin = server.uri();
        let dir = tempfile::tempdir().unwrap();
        start_proxy(&origin, dir.path()).await;
        drop(server);

        let (addr, state) = start_proxy(&origin, dir.path()).await;
        assert_eq!(state.worker().state().await, WorkerState::Activated);

        let client = reqwest::Client::new();
        let css = client
            .get(format!("http://{addr}/styles.css"))
            .send()
            .await
            .unwrap();
        assert_eq!(css.status(), 200);
        assert_eq!(css.text().await.unwrap(), "body {}");

        let page = client
            .get(format!("http://{addr}/index.html"))
            .send()
            .await
            .unwrap();
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<html>index</html>");
    }

    #[tokio::test]
    async fn test_revalidation_gets_the_page_not_the_shell() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let (addr, _state) = start_proxy(&server.uri(), dir.path()).await;

        let page = reqwest::Client::new()
            .get(format!("http://{addr}/about.html"))
            .header("if-none-match", "\"abc\"")
            .send()
            .await
            .unwrap();
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<html>about</html>");
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let (addr, _state) = start_proxy(&server.uri(), dir.path()).await;

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/contact"))
            .body("salam")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(response.text().await.unwrap(), "sent");
    }

    #[tokio::test]
    async fn test_control_channel_over_http() {
        let server = origin_server().await;
        let dir = tempfile::tempdir().unwrap();
        let (addr, _state) = start_proxy(&server.uri(), dir.path()).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}{CONTROL_PATH}");
        let post = |message: JsonValue| {
            client
                .post(&url)
                .header("content-type", "application/json")
                .body(message.to_string())
                .send()
        };

        let version = post(json!({ "type": "GET_VERSION" })).await.unwrap();
        assert_eq!(version.status(), 200);
        let body: JsonValue = serde_json::from_str(&version.text().await.unwrap()).unwrap();
        assert_eq!(body, json!({ "type": "VERSION", "version": "1.0.0" }));

        let status = post(json!({ "type": "CACHE_STATUS" })).await.unwrap();
        let body: JsonValue = serde_json::from_str(&status.text().await.unwrap()).unwrap();
        assert_eq!(body["exists"], json!(true));

        let bogus = post(json!({ "type": "bogus" })).await.unwrap();
        assert_eq!(bogus.status(), 204);

        let garbage = client
            .post(&url)
            .header("content-type", "text/plain")
            .body("skip waiting please")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), 204);
    }
}
