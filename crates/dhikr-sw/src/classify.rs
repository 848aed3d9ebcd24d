//! Routing category for a request path.


/// Extensions served cache-first. Matched case-sensitively.
pub const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "json", "ico", "png", "jpg", "jpeg", "svg", "woff", "woff2",
];

/// How a request is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingCategory {
    /// Immutable per deployment; served cache-first.
    StaticAsset,
    /// Documents; served network-first with an app-shell fallback.
    HtmlPage,
    /// Everything else; served network-first.
    Other,
}

impl RoutingCategory {
    /// Classify a URL path.
    pub fn classify(path: &str) -> Self {
        if has_static_extension(path) {
            RoutingCategory::StaticAsset
        } else if path == "/" || path.ends_with(".html") {
            RoutingCategory::HtmlPage
        } else {
            RoutingCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingCategory::StaticAsset => "static",
            RoutingCategory::HtmlPage => "page",
            RoutingCategory::Other => "other",
        }
    }
}

fn has_static_extension(path: &str) -> bool {
    STATIC_EXTENSIONS.iter().any(|ext| {
        path.strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.'))
    })
}
