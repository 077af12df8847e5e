//! CGI gateway over a real listener.

mod common;

use std::path::Path;
use std::time::Duration;

use common::{client, free_port, TestServer};
use reqwest::StatusCode;

fn write_script(dir: &Path, name: &str, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), body).unwrap();
}

async fn start(tmp: &Path) -> (TestServer, u16) {
    let port = free_port();
    let config = format!(
        r#"{{
            "port": {port},
            "logging": false,
            "cgi": {{ "directory": "scripts", "interpreters": {{ ".sh": "sh" }} }},
            "unhandled": {{ "*": {{ "status": 404, "send": "fallback" }} }}
        }}"#
    );
    (TestServer::start(&config, tmp).await, port)
}

#[tokio::test]
async fn script_output_becomes_response() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(
        &tmp.path().join("scripts"),
        "hello.sh",
        "printf 'Status: 201 Created\\r\\nContent-Type: text/plain\\r\\nX-Method: %s\\r\\n\\r\\n' \"$REQUEST_METHOD\"\n\
         printf 'query=%s agent=%s' \"$QUERY_STRING\" \"$HTTP_X_AGENT\"\n",
    );
    let (server, port) = start(tmp.path()).await;

    let res = client()
        .get(server.url(port, "/cgi-bin/hello.sh?name=world"))
        .header("x-agent", "tests")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-method"], "GET");
    assert!(!res.headers().contains_key("status"));
    assert_eq!(res.text().await.unwrap(), "query=name=world agent=tests");

    server.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn request_body_streams_to_script() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(
        &tmp.path().join("scripts"),
        "echo.sh",
        "printf 'Content-Type: application/octet-stream\\n\\n'\ncat\n",
    );
    let (server, port) = start(tmp.path()).await;

    let payload = "0123456789".repeat(10_000);
    let res = client()
        .post(server.url(port, "/cgi-bin/echo.sh"))
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), payload);

    server.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn script_without_head_is_500() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(&tmp.path().join("scripts"), "silent.sh", "exit 0\n");
    let (server, port) = start(tmp.path()).await;

    let res = client()
        .get(server.url(port, "/cgi-bin/silent.sh"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "CGI script produced no output");

    server.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn unknown_extension_and_missing_script_fall_through() {
    let tmp = tempfile::tempdir().unwrap();
    write_script(&tmp.path().join("scripts"), "notes.txt", "not a script");
    let (server, port) = start(tmp.path()).await;
    let http = client();

    for path in ["/cgi-bin/notes.txt", "/cgi-bin/absent.sh"] {
        let res = http.get(server.url(port, path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.text().await.unwrap(), "fallback");
    }

    server.shutdown(Duration::from_secs(5)).await;
}
