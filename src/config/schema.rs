//! Configuration schema definitions.
//!
//! This module defines the site descriptor structure consumed by the
//! topology builder. All types derive Serde traits for deserialization from
//! the JSON config file.

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Host marker meaning "any host".
pub const WILDCARD_HOST: &str = "*";

/// Default CGI mount path.
pub const DEFAULT_CGI_PATH: &str = "/cgi-bin";

/// The whole config document: one site object or an array of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ConfigDocument {
    Many(Vec<SiteDescriptor>),
    One(Box<SiteDescriptor>),
}

impl ConfigDocument {
    /// Flatten into the list of site descriptors.
    pub fn into_sites(self) -> Vec<SiteDescriptor> {
        match self {
            ConfigDocument::Many(sites) => sites,
            ConfigDocument::One(site) => vec![*site],
        }
    }
}

/// One routing unit binding a host and port to a request pipeline.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteDescriptor {
    /// Hostname to match (exact, case-insensitive). `None` or `*` = any host.
    pub host: Option<String>,

    /// Listening port. `None` falls back to `PORT`, then 8080.
    pub port: Option<i64>,

    /// Static content directories.
    pub folders: Option<MountTree>,

    /// Upstream URLs.
    pub proxy: Option<MountTree>,

    /// CGI gateway settings.
    pub cgi: Option<CgiConfig>,

    /// Response headers set on every response of this site.
    pub headers: IndexMap<String, String>,

    /// Fallback responses keyed by Accept matcher, in declaration order.
    pub unhandled: IndexMap<String, UnhandledResponse>,

    /// TLS material.
    pub ssl: Option<TlsConfig>,

    pub hot_reload: bool,

    /// Per-site request logging (enabled unless explicitly `false`).
    pub logging: Option<bool>,

    pub cors: Option<Toggle<CorsOptions>>,
    pub compression: Option<Toggle<CompressionOptions>>,
    pub helmet: Option<Toggle<HelmetOptions>>,
    pub rate_limit: Option<Toggle<RateLimitOptions>>,
    pub basic_auth: Option<BasicAuthOptions>,
    pub response_time: Option<Toggle<ResponseTimeOptions>>,

    /// Path of the icon served at `/favicon.ico`.
    pub favicon: Option<PathBuf>,
}

impl SiteDescriptor {
    /// True when this descriptor matches any host.
    pub fn is_wildcard(&self) -> bool {
        match self.host.as_deref() {
            None => true,
            Some(h) => h.is_empty() || h == WILDCARD_HOST,
        }
    }

    /// Host key used for duplicate detection (lowercased, wildcard collapsed).
    pub fn host_key(&self) -> String {
        if self.is_wildcard() {
            WILDCARD_HOST.to_string()
        } else {
            self.host.as_deref().unwrap_or_default().to_ascii_lowercase()
        }
    }

    /// Host as shown in logs and errors.
    pub fn display_host(&self) -> &str {
        if self.is_wildcard() {
            WILDCARD_HOST
        } else {
            self.host.as_deref().unwrap_or(WILDCARD_HOST)
        }
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging.unwrap_or(true)
    }
}

/// Recursive mount shape shared by `folders` and `proxy`.
///
/// A leaf is a directory path (or upstream URL), a list mounts every entry
/// at the same prefix, and a named map extends the prefix with each key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MountTree {
    Leaf(String),
    List(Vec<MountTree>),
    Named(IndexMap<String, MountTree>),
}

/// A middleware block given either as a flag or as an options object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Toggle<T> {
    Flag(bool),
    Options(T),
}

impl<T: Clone + Default> Toggle<T> {
    /// Effective options, or `None` when the block is switched off.
    pub fn resolve(&self) -> Option<T> {
        match self {
            Toggle::Flag(true) => Some(T::default()),
            Toggle::Flag(false) => None,
            Toggle::Options(opts) => Some(opts.clone()),
        }
    }
}

/// Resolve an optional toggle block.
pub fn enabled<T: Clone + Default>(block: &Option<Toggle<T>>) -> Option<T> {
    block.as_ref().and_then(Toggle::resolve)
}

/// CGI gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CgiConfig {
    /// URL mount path.
    pub path: String,

    /// Sandbox directory holding the scripts.
    pub directory: PathBuf,

    /// Allowed script extensions (with or without the leading dot).
    pub extensions: Vec<String>,

    /// Interpreter executable per extension.
    pub interpreters: HashMap<String, String>,
}

impl Default for CgiConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_CGI_PATH.to_string(),
            directory: PathBuf::from("cgi-bin"),
            extensions: vec![
                ".cgi".to_string(),
                ".pl".to_string(),
                ".py".to_string(),
                ".sh".to_string(),
            ],
            interpreters: HashMap::new(),
        }
    }
}

/// Status code as written in the config: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StatusSpec {
    Number(serde_json::Number),
    Text(String),
}

/// Terminal response for requests nothing else handled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UnhandledResponse {
    pub status: Option<StatusSpec>,

    /// Literal body.
    pub send: Option<String>,

    /// File whose contents become the body (relative to the working directory).
    pub file: Option<PathBuf>,

    pub headers: IndexMap<String, String>,
}

/// TLS configuration for a port.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to private key file (PEM).
    pub key: PathBuf,

    /// Path to certificate file (PEM).
    pub cert: PathBuf,

    /// Optional CA bundle appended to the served chain (PEM).
    #[serde(default)]
    pub ca: Option<PathBuf>,
}

/// Origin setting for CORS: a single origin or a list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OriginSpec {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorsOptions {
    /// Allowed origins. Missing or `*` allows any origin.
    pub origin: Option<OriginSpec>,
    pub methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub credentials: bool,
    /// Preflight cache lifetime in seconds.
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionOptions {
    /// Minimum body size in bytes before compressing.
    pub threshold: u16,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { threshold: 1024 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelmetOptions {
    /// Content-Security-Policy value; `false` omits the header.
    pub content_security_policy: Toggle<String>,
    /// Send Strict-Transport-Security.
    pub hsts: bool,
}

impl Default for HelmetOptions {
    fn default() -> Self {
        Self {
            content_security_policy: Toggle::Flag(true),
            hsts: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitOptions {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests allowed per window per client.
    pub max: u32,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BasicAuthOptions {
    /// Username to password.
    pub users: HashMap<String, String>,
    pub realm: String,
    /// Send a `WWW-Authenticate` challenge on failure.
    pub challenge: bool,
}

impl Default for BasicAuthOptions {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            realm: "Restricted".to_string(),
            challenge: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseTimeOptions {
    pub header: String,
    pub digits: usize,
}

impl Default for ResponseTimeOptions {
    fn default() -> Self {
        Self {
            header: "X-Response-Time".to_string(),
            digits: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_object_and_array() {
        let one: ConfigDocument = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(one.into_sites().len(), 1);

        let many: ConfigDocument =
            serde_json::from_str(r#"[{"host": "a.com"}, {"host": "b.com"}]"#).unwrap();
        assert_eq!(many.into_sites().len(), 2);
    }

    #[test]
    fn parses_mount_tree_shapes() {
        let site: SiteDescriptor = serde_json::from_str(
            r#"{"folders": {"/docs": ["a", "b"], "/img": {"/x": "c"}}, "proxy": "http://up:3000"}"#,
        )
        .unwrap();

        let Some(MountTree::Named(map)) = site.folders else {
            panic!("expected named tree");
        };
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["/docs", "/img"]);
        assert_eq!(
            map["/docs"],
            MountTree::List(vec![
                MountTree::Leaf("a".into()),
                MountTree::Leaf("b".into())
            ])
        );
        assert_eq!(site.proxy, Some(MountTree::Leaf("http://up:3000".into())));
    }

    #[test]
    fn toggles_resolve() {
        let site: SiteDescriptor = serde_json::from_str(
            r#"{"compression": true, "cors": false, "rateLimit": {"max": 5}}"#,
        )
        .unwrap();

        assert_eq!(enabled(&site.compression).unwrap().threshold, 1024);
        assert!(enabled(&site.cors).is_none());
        let rl = enabled(&site.rate_limit).unwrap();
        assert_eq!(rl.max, 5);
        assert_eq!(rl.window_ms, 60_000);
        assert!(enabled(&site.helmet).is_none());
    }

    #[test]
    fn wildcard_detection() {
        let mut site = SiteDescriptor::default();
        assert!(site.is_wildcard());
        site.host = Some("*".into());
        assert!(site.is_wildcard());
        site.host = Some("Example.COM".into());
        assert!(!site.is_wildcard());
        assert_eq!(site.host_key(), "example.com");
    }

    #[test]
    fn unhandled_keeps_declaration_order() {
        let site: SiteDescriptor = serde_json::from_str(
            r#"{"unhandled": {"application/json": {"status": "400"}, "*": {"status": 404, "send": "nope"}}}"#,
        )
        .unwrap();
        let keys: Vec<_> = site.unhandled.keys().cloned().collect();
        assert_eq!(keys, vec!["application/json", "*"]);
        assert_eq!(
            site.unhandled["application/json"].status,
            Some(StatusSpec::Text("400".into()))
        );
    }
}
