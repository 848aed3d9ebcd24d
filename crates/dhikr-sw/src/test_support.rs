//! Scripted network for worker tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use url::Url;

use crate::config::{AssetManifest, WorkerConfig};
use crate::fetch::{Request, Response};
use crate::network::Network;
use crate::SwError;

pub(crate) const ORIGIN: &str = "https://dhikr.example/";

#[derive(Debug, Clone)]
struct Route {
    status: StatusCode,
    body: String,
}

/// A network whose answers are set per path, with a call counter.
#[derive(Debug, Default)]
pub(crate) struct MockNetwork {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl MockNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Network serving every path of the test app.
    pub(crate) fn serving_app() -> Self {
        let network = Self::new();
        for (path, body) in [
            ("/", "<html>shell</html>"),
            ("/index.html", "<html>index</html>"),
            ("/about.html", "<html>about</html>"),
            ("/styles.css", "body { color: teal }"),
            ("/app.js", "let count = 0;"),
            ("/icons/icon-192.png", "png"),
            ("/fonts/amiri.woff2", "woff2"),
            ("/api/counters", "[]"),
        ] {
            network.set(path, StatusCode::OK, body);
        }
        network
    }

    pub(crate) fn set(&self, path: &str, status: StatusCode, body: &str) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                status,
                body: body.to_string(),
            },
        );
    }

    pub(crate) fn remove(&self, path: &str) {
        self.routes.lock().unwrap().remove(path);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every request hang until the caller's timeout fires.
    pub(crate) fn set_hanging(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(SwError::NetworkError("connection refused".into()));
        }

        let route = self.routes.lock().unwrap().get(request.path()).cloned();
        let Some(route) = route else {
            return Ok(Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "not found"));
        };

        // Answer validators and ranges the way an origin would.
        if request.headers.contains_key(header::IF_NONE_MATCH) {
            return Ok(Response::new(StatusCode::NOT_MODIFIED, HeaderMap::new(), ""));
        }
        let mut body = route.body;
        let mut status = route.status;
        if request.headers.contains_key(header::RANGE) {
            body.truncate(body.len() / 2);
            status = StatusCode::PARTIAL_CONTENT;
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Ok(Response::new(status, headers, body))
    }
}

/// Configuration for the test app.
pub(crate) fn app_config() -> WorkerConfig {
    let mut config = WorkerConfig::new(Url::parse(ORIGIN).unwrap());
    config.manifest = AssetManifest {
        core: vec![
            "/".into(),
            "/index.html".into(),
            "/styles.css".into(),
            "/app.js".into(),
        ],
        optional: vec!["/icons/icon-192.png".into(), "/fonts/amiri.woff2".into()],
    };
    config.network_timeout_ms = 200;
    config
}

pub(crate) fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
}
