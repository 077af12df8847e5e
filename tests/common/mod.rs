//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use site_proxy::config::loader::parse_config;
use site_proxy::lifecycle::{coordinate, start_all, Drain, RunningListener, ShutdownOutcome};
use site_proxy::routing::topology;
use site_proxy::PipelineCompiler;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A port the OS reports as free right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Listeners started from a JSON config, with `cwd` as working directory.
pub struct TestServer {
    pub listeners: Vec<RunningListener>,
}

impl TestServer {
    pub async fn start(config: &str, cwd: &Path) -> Self {
        let sites = parse_config(config).unwrap();
        let groups = topology::build(sites, None).unwrap();
        let listeners = start_all(&groups, &PipelineCompiler::new(cwd))
            .await
            .unwrap();
        Self { listeners }
    }

    pub fn url(&self, port: u16, path: &str) -> String {
        format!("http://127.0.0.1:{port}{path}")
    }

    pub fn listener(&self, port: u16) -> &RunningListener {
        self.listeners.iter().find(|l| l.port() == port).unwrap()
    }

    pub async fn shutdown(self, deadline: Duration) -> ShutdownOutcome {
        let listeners = self
            .listeners
            .into_iter()
            .map(|l| Box::new(l) as Box<dyn Drain>)
            .collect();
        coordinate(listeners, deadline).await
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_head(&mut socket).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

/// Start a backend that answers with the request head it received.
pub async fn start_echo_backend(addr: SocketAddr) {
    start_programmable_backend(addr, |head| async move { (200, head) }).await;
}

/// Start a programmable mock backend. `f` receives the raw request head.
pub async fn start_programmable_backend<F, Fut>(addr: SocketAddr, f: F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = std::sync::Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(head).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
