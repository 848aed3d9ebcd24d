use std::sync::Arc;

use dhikr_net::{HttpNetwork, LoaderConfig};
use dhikr_sw::{MemoryCacheStorage, Network, Request, ResponseSource, ServiceWorker, WorkerConfig};
use http::StatusCode;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn network() -> HttpNetwork {
    HttpNetwork::new(LoaderConfig::default()).unwrap()
}

#[tokio::test]
async fn fetch_reads_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/styles.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/css")
                .set_body_string("body { color: teal }"),
        )
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/styles.css", server.uri())).unwrap();
    let response = network().fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("text/css"));
    assert_eq!(response.body(), b"body { color: teal }");
}

#[tokio::test]
async fn error_status_is_a_response_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(path("/missing.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/missing.html", server.uri())).unwrap();
    let response = network().fetch(&Request::get(url)).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    // Port 9 (discard) on localhost is closed in test environments.
    let url = Url::parse("http://127.0.0.1:9/").unwrap();
    assert!(network().fetch(&Request::get(url)).await.is_err());
}

#[tokio::test]
async fn worker_installs_and_serves_over_http() {
    let server = MockServer::start().await;
    for (asset, body) in [
        ("/", "<html>shell</html>"),
        ("/index.html", "<html>index</html>"),
        ("/styles.css", "body {}"),
        ("/app.js", "let count = 0;"),
    ] {
        Mock::given(method("GET"))
            .and(path(asset))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    let origin = Url::parse(&server.uri()).unwrap();
    let mut config = WorkerConfig::new(origin.clone());
    config.manifest.core = vec!["/".into(), "/index.html".into(), "/styles.css".into(), "/app.js".into()];
    config.manifest.optional = vec!["/icons/missing.png".into()];

    let store = Arc::new(MemoryCacheStorage::new());
    let worker = ServiceWorker::new(config, store, Arc::new(network())).unwrap();

    let report = worker.on_install().await.unwrap();
    assert_eq!(report.core_cached, 4);
    assert_eq!(report.optional_failed, vec!["/icons/missing.png"]);
    worker.on_activate().await.unwrap();

    let css = worker
        .on_fetch(Request::get(origin.join("/styles.css").unwrap()))
        .await
        .into_response()
        .unwrap();
    assert_eq!(css.source(), ResponseSource::Cache);
    assert_eq!(css.body(), b"body {}");

    let page = worker
        .on_fetch(Request::get(origin.join("/index.html").unwrap()))
        .await
        .into_response()
        .unwrap();
    assert_eq!(page.source(), ResponseSource::Network);
}
