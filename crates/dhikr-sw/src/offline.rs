//! Responses synthesized when neither network nor cache can answer.

use http::StatusCode;

use crate::fetch::Response;

/// Self-contained offline document. No external references.
pub const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - Dhikr Counter</title>
<style>
  body { margin: 0; min-height: 100vh; display: flex; align-items: center; justify-content: center;
         font-family: system-ui, -apple-system, "Segoe UI", sans-serif; background: #0f3d3e; color: #f1f1e6; }
  main { max-width: 28rem; padding: 2rem; text-align: center; }
  h1 { font-size: 1.5rem; margin: 0 0 0.75rem; }
  p { line-height: 1.5; opacity: 0.85; }
  button { margin-top: 1.25rem; padding: 0.6rem 1.4rem; border: 0; border-radius: 999px;
           background: #e2b714; color: #0f3d3e; font-size: 1rem; cursor: pointer; }
</style>
</head>
<body>
<main>
  <h1>You are offline</h1>
  <p>This page has not been saved for offline use yet. Your counters are stored on this device and will be here when you reconnect.</p>
  <button type="button" onclick="location.reload()">Try again</button>
</main>
</body>
</html>
"#;

/// The offline placeholder document (200, `text/html`).
pub fn offline_page() -> Response {
    Response::synthesized(StatusCode::OK, "text/html; charset=utf-8", OFFLINE_PAGE)
}

/// Plain-text 503 for requests nothing could satisfy.
pub fn service_unavailable() -> Response {
    Response::synthesized(
        StatusCode::SERVICE_UNAVAILABLE,
        "text/plain; charset=utf-8",
        "Service unavailable: offline and not cached",
    )
}
