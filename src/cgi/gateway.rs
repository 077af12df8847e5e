//! CGI gateway stage: runs a script per request and streams its output.
//!
//! # Data Flow
//! ```text
//! request under mount
//!     → resolve script inside the sandbox directory (else pass through)
//!     → spawn interpreter/script with the CGI environment
//!     → request body  ──stream──▶ child stdin
//!     → child stdout  ──parse head──▶ status + headers
//!     → remaining stdout ──stream──▶ response body
//!     → child stderr  ──▶ logs
//! ```
//!
//! # Design Decisions
//! - Canonical path must stay under the canonical sandbox root
//! - Neither body is buffered; the pipes provide backpressure
//! - The child is killed if the client goes away mid-response

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::cgi::env::{build_env, ScriptInfo};
use crate::cgi::parser::{CgiHead, CgiOutputParser};
use crate::config::schema::CgiConfig;
use crate::http::mount::{normalize_prefix, resolve_dir, strip_mount};
use crate::http::stage::Outcome;
use crate::observability::metrics;

const READ_CHUNK: usize = 16 * 1024;

/// Body of the 500 sent when a script exits before finishing its headers.
pub const NO_OUTPUT_MESSAGE: &str = "CGI script produced no output";

/// A script that passed the sandbox and extension checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Canonical path on disk.
    pub path: PathBuf,
    /// URL path of the script.
    pub url_path: String,
    /// Normalized extension (lowercase, no dot).
    pub extension: String,
}

/// The CGI stage of a site pipeline.
#[derive(Debug, Clone)]
pub struct CgiGateway {
    mount: String,
    root: PathBuf,
    extensions: HashSet<String>,
    interpreters: HashMap<String, String>,
    port: u16,
}

fn normalize_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

impl CgiGateway {
    pub fn new(config: &CgiConfig, port: u16, cwd: &Path) -> Self {
        Self {
            mount: normalize_prefix(&config.path),
            root: resolve_dir(&config.directory.to_string_lossy(), cwd),
            extensions: config.extensions.iter().map(|e| normalize_ext(e)).collect(),
            interpreters: config
                .interpreters
                .iter()
                .map(|(ext, exe)| (normalize_ext(ext), exe.clone()))
                .collect(),
            port,
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn handle(&self, req: Request) -> Outcome {
        match self.resolve_script(req.uri().path()).await {
            Some(script) => Outcome::Respond(self.execute(req, script).await),
            None => Outcome::Next(req),
        }
    }

    /// Map a request path to a script inside the sandbox, or `None` to pass.
    pub async fn resolve_script(&self, request_path: &str) -> Option<ResolvedScript> {
        let rest = strip_mount(&self.mount, request_path)?;
        let relative = rest.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let root = tokio::fs::canonicalize(&self.root).await.ok()?;
        let candidate = tokio::fs::canonicalize(root.join(relative)).await.ok()?;
        if !candidate.starts_with(&root) {
            tracing::warn!(
                path = %request_path,
                resolved = %candidate.display(),
                "CGI path escapes its directory, passing through"
            );
            return None;
        }

        let extension = candidate
            .extension()
            .map(|e| normalize_ext(&e.to_string_lossy()))?;
        if !self.extensions.contains(&extension) {
            return None;
        }
        if !tokio::fs::metadata(&candidate).await.ok()?.is_file() {
            return None;
        }

        Some(ResolvedScript {
            path: candidate,
            url_path: request_path.to_string(),
            extension,
        })
    }

    async fn execute(&self, req: Request, script: ResolvedScript) -> Response {
        let env = build_env(
            &req,
            &ScriptInfo {
                filename: &script.path,
                name: &script.url_path,
                server_port: self.port,
            },
        );

        let mut cmd = match self.interpreters.get(&script.extension) {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&script.path);
                cmd
            }
            None => Command::new(&script.path),
        };
        if let Some(dir) = script.path.parent() {
            cmd.current_dir(dir);
        }
        cmd.envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(script = %script.url_path, error = %e, "CGI spawn failed");
                metrics::record_cgi("spawn_error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("CGI spawn failed: {e}"),
                )
                    .into_response();
            }
        };
        metrics::record_cgi("spawned");
        tracing::debug!(script = %script.url_path, pid = ?child.id(), "CGI process started");

        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(pump_request_body(req.into_body(), stdin));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, script.url_path.clone()));
        }
        let Some(mut stdout) = child.stdout.take() else {
            reap(child, script.url_path);
            return (StatusCode::INTERNAL_SERVER_ERROR, NO_OUTPUT_MESSAGE).into_response();
        };

        let mut parser = CgiOutputParser::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        let (head, first) = loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => {
                    tracing::warn!(
                        script = %script.url_path,
                        buffered = parser.buffered(),
                        "CGI script exited before sending headers"
                    );
                    metrics::record_cgi("no_output");
                    reap(child, script.url_path);
                    return (StatusCode::INTERNAL_SERVER_ERROR, NO_OUTPUT_MESSAGE).into_response();
                }
                Ok(n) => {
                    if let Some(parsed) = parser.feed(&chunk[..n]) {
                        break parsed;
                    }
                }
                Err(e) => {
                    tracing::error!(script = %script.url_path, error = %e, "CGI stdout read failed");
                    reap(child, script.url_path);
                    return (StatusCode::INTERNAL_SERVER_ERROR, NO_OUTPUT_MESSAGE).into_response();
                }
            }
        };

        let body = CgiBody {
            first: (!first.is_empty()).then(|| Bytes::from(first)),
            stdout,
            child: Some(child),
            script: script.url_path,
        };
        build_response(head, body)
    }
}

fn build_response(head: CgiHead, body: CgiBody) -> Response {
    let mut res = Response::new(Body::from_stream(body.into_stream()));
    *res.status_mut() = head.status;
    for (name, value) in head.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                res.headers_mut().append(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid CGI response header"),
        }
    }
    res
}

/// Remaining stdout of a running script, exposed as a byte stream.
struct CgiBody {
    first: Option<Bytes>,
    stdout: ChildStdout,
    child: Option<Child>,
    script: String,
}

impl CgiBody {
    fn into_stream(self) -> impl futures_util::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        stream::unfold(self, |mut body| async move {
            if let Some(first) = body.first.take() {
                return Some((Ok(first), body));
            }
            body.child.as_ref()?;

            let mut chunk = vec![0u8; READ_CHUNK];
            match body.stdout.read(&mut chunk).await {
                Ok(0) => {
                    if let Some(child) = body.child.take() {
                        reap(child, body.script.clone());
                    }
                    None
                }
                Ok(n) => {
                    chunk.truncate(n);
                    Some((Ok(Bytes::from(chunk)), body))
                }
                Err(e) => {
                    tracing::error!(script = %body.script, error = %e, "CGI stdout read failed");
                    if let Some(child) = body.child.take() {
                        reap(child, body.script.clone());
                    }
                    Some((Err(e), body))
                }
            }
        })
    }
}

/// Copy the request body into the child's stdin, then close it.
async fn pump_request_body(body: Body, mut stdin: ChildStdin) {
    let mut data = body.into_data_stream();
    while let Some(chunk) = data.next().await {
        match chunk {
            Ok(bytes) => {
                if let Err(e) = stdin.write_all(&bytes).await {
                    // Scripts may exit without reading their input
                    tracing::debug!(error = %e, "CGI stdin closed early");
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Request body aborted");
                return;
            }
        }
    }
    let _ = stdin.shutdown().await;
}

async fn log_stderr(stderr: ChildStderr, script: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(script = %script, "cgi stderr: {}", line);
    }
}

/// Wait for the child in the background and log how it ended.
fn reap(mut child: Child, script: String) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::debug!(script = %script, "CGI process exited");
            }
            Ok(status) => tracing::warn!(script = %script, %status, "CGI process exited with failure"),
            Err(e) => tracing::error!(script = %script, error = %e, "CGI wait failed"),
        }
    });
}
