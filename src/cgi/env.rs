//! CGI/1.1 environment construction.

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
};
use std::net::SocketAddr;
use std::path::Path;

use crate::routing::matcher::request_host;

/// Value of `SERVER_SOFTWARE`.
pub const SERVER_SOFTWARE: &str = concat!("site-proxy/", env!("CARGO_PKG_VERSION"));

/// Script-specific inputs to the environment.
#[derive(Debug, Clone)]
pub struct ScriptInfo<'a> {
    /// Absolute path of the script on disk.
    pub filename: &'a Path,
    /// URL path of the script.
    pub name: &'a str,
    pub server_port: u16,
}

/// `HTTP_*` variable name for a request header.
pub fn header_env_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 5);
    out.push_str("HTTP_");
    out.extend(name.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    out
}

/// Environment for one invocation. The parent's environment is inherited
/// separately by the process builder; these entries override it.
pub fn build_env(req: &Request, script: &ScriptInfo<'_>) -> Vec<(String, String)> {
    let headers = req.headers();
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();

    let mut env = vec![
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string()),
        ("SERVER_SOFTWARE".to_string(), SERVER_SOFTWARE.to_string()),
        (
            "REQUEST_METHOD".to_string(),
            req.method().as_str().to_ascii_uppercase(),
        ),
        (
            "SCRIPT_FILENAME".to_string(),
            script.filename.display().to_string(),
        ),
        ("SCRIPT_NAME".to_string(), script.name.to_string()),
        ("PATH_INFO".to_string(), String::new()),
        (
            "QUERY_STRING".to_string(),
            req.uri().query().unwrap_or_default().to_string(),
        ),
        ("REMOTE_ADDR".to_string(), remote_addr),
        (
            "CONTENT_TYPE".to_string(),
            header_str(header::CONTENT_TYPE).unwrap_or_default(),
        ),
        (
            "CONTENT_LENGTH".to_string(),
            header_str(header::CONTENT_LENGTH).unwrap_or_else(|| "0".to_string()),
        ),
        (
            "SERVER_NAME".to_string(),
            request_host(req).unwrap_or_else(|| "localhost".to_string()),
        ),
        ("SERVER_PORT".to_string(), script.server_port.to_string()),
    ];
    env.extend(header_vars(headers));
    env
}

/// One `HTTP_*` entry per header name, multi-valued headers joined by `", "`.
pub fn header_vars(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (header_env_name(name.as_str()), joined)
        })
        .collect()
}
