//! Worker configuration: namespace identity and the asset manifest.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::SwError;

/// Assets cached at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Must all be cached or install fails.
    #[serde(rename = "core_assets", default = "default_core_assets")]
    pub core: Vec<String>,

    /// Cached best-effort.
    #[serde(rename = "optional_assets", default = "default_optional_assets")]
    pub optional: Vec<String>,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            core: default_core_assets(),
            optional: default_optional_assets(),
        }
    }
}

fn default_core_assets() -> Vec<String> {
    ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_optional_assets() -> Vec<String> {
    [
        "/favicon.ico",
        "/icons/icon-192.png",
        "/icons/icon-512.png",
        "/fonts/amiri-regular.woff2",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_cache_name() -> String {
    "dhikr-counter".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_network_timeout_ms() -> u64 {
    10_000
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Logical cache name
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Semantic version; bumping it supersedes the current namespace
    #[serde(default = "default_version")]
    pub version: String,

    /// The single origin the worker serves
    pub origin: Url,

    #[serde(flatten)]
    pub manifest: AssetManifest,

    /// Upper bound on every network attempt
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,
}

impl WorkerConfig {
    /// Default configuration for `origin`.
    pub fn new(origin: Url) -> Self {
        Self {
            cache_name: default_cache_name(),
            version: default_version(),
            origin,
            manifest: AssetManifest::default(),
            network_timeout_ms: default_network_timeout_ms(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, SwError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SwError::ConfigError(format!("invalid worker config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Current namespace identifier, `{cache_name}-v{version}`.
    pub fn namespace(&self) -> String {
        format!("{}-v{}", self.cache_name, self.version)
    }

    /// The same configuration at the version that owns `namespace`, if the
    /// namespace belongs to this cache name.
    pub fn for_namespace(&self, namespace: &str) -> Option<Self> {
        let version = namespace
            .strip_prefix(self.cache_name.as_str())?
            .strip_prefix("-v")?;
        let mut config = self.clone();
        config.version = version.to_string();
        config.validate().ok()?;
        Some(config)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    /// URL of the root document used as the app-shell fallback.
    pub fn root_url(&self) -> Url {
        let mut root = self.origin.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        root
    }

    /// Resolve a manifest path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, SwError> {
        self.origin
            .join(path)
            .map_err(|e| SwError::ConfigError(format!("bad asset path {path:?}: {e}")))
    }

    pub fn validate(&self) -> Result<(), SwError> {
        if self.cache_name.trim().is_empty() {
            return Err(SwError::ConfigError("cache_name must not be empty".into()));
        }
        let version_ok = !self.version.is_empty()
            && self
                .version
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !version_ok {
            return Err(SwError::ConfigError(format!(
                "version {:?} is not a dotted numeric version",
                self.version
            )));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(SwError::ConfigError(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        if self.network_timeout_ms == 0 {
            return Err(SwError::ConfigError("network_timeout_ms must be positive".into()));
        }
        for path in self.manifest.core.iter().chain(&self.manifest.optional) {
            if !path.starts_with('/') {
                return Err(SwError::ConfigError(format!(
                    "asset path {path:?} must start with '/'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://dhikr.example/").unwrap()
    }

    #[test]
    fn test_for_namespace() {
        let config = WorkerConfig::new(origin());

        let previous = config.for_namespace("dhikr-counter-v0.9.2").unwrap();
        assert_eq!(previous.version, "0.9.2");
        assert_eq!(previous.namespace(), "dhikr-counter-v0.9.2");

        assert!(config.for_namespace("other-app-v1.0.0").is_none());
        assert!(config.for_namespace("dhikr-counter-vnext").is_none());
    }

    #[test]
    fn test_namespace_identifier() {
        let mut config = WorkerConfig::new(origin());
        assert_eq!(config.namespace(), "dhikr-counter-v1.0.0");

        config.version = "1.2.0".into();
        assert_eq!(config.namespace(), "dhikr-counter-v1.2.0");
    }

    #[test]
    fn test_from_json_with_defaults() {
        let config = WorkerConfig::from_json(
            r#"{
                "origin": "https://dhikr.example/",
                "version": "2.1.0",
                "core_assets": ["/", "/app.js"]
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache_name, "dhikr-counter");
        assert_eq!(config.manifest.core, vec!["/", "/app.js"]);
        assert_eq!(config.manifest.optional, default_optional_assets());
        assert_eq!(config.network_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validation() {
        let mut config = WorkerConfig::new(origin());
        assert!(config.validate().is_ok());

        config.version = "1.x".into();
        assert!(matches!(config.validate(), Err(SwError::ConfigError(_))));

        let mut config = WorkerConfig::new(origin());
        config.manifest.optional.push("icons/relative.png".into());
        assert!(matches!(config.validate(), Err(SwError::ConfigError(_))));

        assert!(WorkerConfig::from_json(r#"{ "version": "1.0.0" }"#).is_err());
    }

    #[test]
    fn test_root_url() {
        let config = WorkerConfig::new(Url::parse("https://dhikr.example/app/?x=1").unwrap());
        assert_eq!(config.root_url().as_str(), "https://dhikr.example/");
    }
}
