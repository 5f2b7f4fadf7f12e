//! Integration tests for the `promptgate serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// The base port is derived from the process ID so separate test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const ENV_VARS: [&str; 5] = [
    "PROMPTGATE_PORT",
    "PROMPTGATE_PUBLIC_BASE_URL",
    "PROMPTGATE_RATE_LIMIT",
    "PROMPTGATE_API_KEY",
    "PROMPTGATE_DB_PATH",
];

/// Kills the server when the test ends, pass or fail.
struct Server {
    child: Child,
    port: u16,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Helper: start `promptgate serve` on a fresh port.
fn start_server(config: Option<&Path>, env: &[(&str, &str)]) -> Server {
    let port = next_port();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_promptgate"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    if let Some(path) = config {
        cmd.arg("--config").arg(path);
    }
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start promptgate serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server { child, port }
}

/// Helper: send one HTTP request and return (status, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let request = match body {
        Some(body) => format!(
            "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method, path, port, header_lines, body.len(), body
        ),
        None => format!(
            "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Connection: close\r\n\r\n",
            method, path, port, header_lines
        ),
    };
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    parse_http_response(&response)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    http_request(port, "GET", path, &[], None)
}

fn http_post(port: u16, path: &str, body: &str) -> (u16, String) {
    http_request(port, "POST", path, &[], Some(body))
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers
        .to_lowercase()
        .contains("transfer-encoding: chunked")
    {
        decode_chunked(&body)
    } else {
        body
    };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, body))
}

fn register(port: u16, prompt_id: &str, version: &str) -> (u16, String) {
    let body = serde_json::json!({
        "promptId": prompt_id,
        "version": version,
        "promptText": "Summarize {{doc}}",
    })
    .to_string();
    http_post(port, "/versions", &body)
}

// ──────────────────────────────────────────────
// Health and routing
// ──────────────────────────────────────────────

#[test]
fn health_returns_ok_with_version() {
    let server = start_server(None, &[]);
    let (status, body) = http_get(server.port, "/health");
    assert_eq!(status, 200);
    let v = json(&body);
    assert_eq!(v["status"], "ok");
    assert!(v["version"].is_string());
}

#[test]
fn unknown_route_is_json_404() {
    let server = start_server(None, &[]);
    let (status, body) = http_get(server.port, "/nope");
    assert_eq!(status, 404);
    assert_eq!(json(&body)["error"], "not found");
}

// ──────────────────────────────────────────────
// Decision flow
// ──────────────────────────────────────────────

#[test]
fn register_approve_and_read_back() {
    let server = start_server(None, &[]);
    let port = server.port;

    let (status, body) = register(port, "p1", "1");
    assert_eq!(status, 201, "body: {}", body);
    assert_eq!(json(&body)["status"], "Pending");

    let (status, body) = http_get(port, "/approve?promptId=p1&version=1");
    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(
        json(&body),
        serde_json::json!({"promptId": "p1", "version": "1", "status": "Approved"})
    );

    // Same decision again: success, no change.
    let (status, body) = http_get(port, "/approve?promptId=p1&version=1");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "Approved");

    // Opposite decision: conflict, record keeps its status.
    let (status, body) = http_get(port, "/reject?promptId=p1&version=1");
    assert_eq!(status, 409);
    assert!(json(&body)["error"].is_string());

    let (status, body) = http_get(port, "/versions/p1/1");
    assert_eq!(status, 200);
    let record = json(&body);
    assert_eq!(record["status"], "Approved");
    assert_eq!(record["promptText"], "Summarize {{doc}}");
}

#[test]
fn reject_pending_version() {
    let server = start_server(None, &[]);
    register(server.port, "p2", "7");
    let (status, body) = http_get(server.port, "/reject?promptId=p2&version=7");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "Rejected");
}

#[test]
fn decision_with_missing_parameters_is_400() {
    let server = start_server(None, &[]);
    let (status, body) = http_get(server.port, "/approve?version=1");
    assert_eq!(status, 400);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap_or("")
        .contains("promptId"));

    let (status, _) = http_get(server.port, "/reject?promptId=&version=1");
    assert_eq!(status, 400);

    let (status, _) = http_get(server.port, "/approve");
    assert_eq!(status, 400);
}

#[test]
fn decision_on_unknown_version_is_404() {
    let server = start_server(None, &[]);
    let (status, body) = http_get(server.port, "/approve?promptId=unknown-id&version=v1");
    assert_eq!(status, 404);
    assert!(json(&body)["error"].is_string());
}

#[test]
fn encoded_identifiers_round_trip() {
    let server = start_server(None, &[]);
    let (status, _) = register(server.port, "team/a b", "1.0");
    assert_eq!(status, 201);
    let (status, body) = http_get(server.port, "/approve?promptId=team%2Fa+b&version=1.0");
    assert_eq!(status, 200, "body: {}", body);
    assert_eq!(json(&body)["promptId"], "team/a b");
}

// ──────────────────────────────────────────────
// Version registry
// ──────────────────────────────────────────────

#[test]
fn duplicate_registration_is_409() {
    let server = start_server(None, &[]);
    assert_eq!(register(server.port, "p1", "1").0, 201);
    let (status, body) = register(server.port, "p1", "1");
    assert_eq!(status, 409);
    assert!(json(&body)["error"].is_string());
}

#[test]
fn registration_with_missing_fields_is_400() {
    let server = start_server(None, &[]);
    let (status, body) = http_post(server.port, "/versions", r#"{"promptId":"p1"}"#);
    assert_eq!(status, 400);
    let error = json(&body)["error"].as_str().unwrap_or("").to_string();
    assert!(error.contains("version"));
    assert!(error.contains("promptText"));

    let (status, _) = http_post(server.port, "/versions", "not json");
    assert_eq!(status, 400);
}

#[test]
fn list_versions_with_status_filter() {
    let server = start_server(None, &[]);
    let port = server.port;
    register(port, "p1", "1");
    register(port, "p1", "2");
    register(port, "p1", "3");
    http_get(port, "/approve?promptId=p1&version=2");

    let (status, body) = http_get(port, "/versions/p1");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["versions"].as_array().map(Vec::len), Some(3));

    let (status, body) = http_get(port, "/versions/p1?status=Approved");
    assert_eq!(status, 200);
    let versions = json(&body)["versions"].clone();
    assert_eq!(versions.as_array().map(Vec::len), Some(1));
    assert_eq!(versions[0]["version"], "2");

    let (status, _) = http_get(port, "/versions/p1?status=Archived");
    assert_eq!(status, 400);
}

#[test]
fn unknown_version_read_is_404() {
    let server = start_server(None, &[]);
    let (status, _) = http_get(server.port, "/versions/p1/404");
    assert_eq!(status, 404);
}

// ──────────────────────────────────────────────
// Feed ingestion
// ──────────────────────────────────────────────

#[test]
fn feed_batch_notifies_inserts_only() {
    let server = start_server(None, &[]);
    let batch = r#"{"Records":[
        {"eventID":"1","eventName":"INSERT","dynamodb":{"NewImage":{
            "promptId":{"S":"p1"},"version":{"S":"1"},"promptText":{"S":"hi"}}}},
        {"eventID":"2","eventName":"MODIFY","dynamodb":{"Keys":{
            "promptId":{"S":"p1"},"version":{"S":"1"}}}},
        {"eventID":"3","eventName":"INSERT","dynamodb":{"Keys":{
            "promptId":{"S":"p1"}}}}
    ]}"#;
    let (status, body) = http_post(server.port, "/feed", batch);
    assert_eq!(status, 200, "body: {}", body);
    let v = json(&body);
    assert_eq!(v["inserts"], 1);
    assert_eq!(v["notified"], 1);
    assert_eq!(v["ignored"], 1);
    assert_eq!(v["skipped"].as_array().map(Vec::len), Some(1));
}

#[test]
fn malformed_feed_batch_is_400() {
    let server = start_server(None, &[]);
    let (status, _) = http_post(server.port, "/feed", r#"{"Records": 5}"#);
    assert_eq!(status, 400);
}

// ──────────────────────────────────────────────
// Security middleware
// ──────────────────────────────────────────────

#[test]
fn api_key_guards_admin_routes_only() {
    let server = start_server(None, &[("PROMPTGATE_API_KEY", "s3cret")]);
    let port = server.port;
    let body = r#"{"promptId":"p1","version":"1","promptText":"t"}"#;

    let (status, _) = http_post(port, "/versions", body);
    assert_eq!(status, 401);

    let (status, _) = http_request(
        port,
        "POST",
        "/versions",
        &[("Authorization", "Bearer wrong")],
        Some(body),
    );
    assert_eq!(status, 403);

    let (status, _) = http_request(
        port,
        "POST",
        "/versions",
        &[("Authorization", "Bearer s3cret")],
        Some(body),
    );
    assert_eq!(status, 201);

    let (status, _) = http_request(port, "GET", "/versions/p1/1", &[("X-API-Key", "s3cret")], None);
    assert_eq!(status, 200);

    // Decision links and health work without credentials.
    let (status, _) = http_get(port, "/health");
    assert_eq!(status, 200);
    let (status, _) = http_get(port, "/approve?promptId=p1&version=1");
    assert_eq!(status, 200);
}

#[test]
fn rate_limit_returns_429() {
    let server = start_server(None, &[("PROMPTGATE_RATE_LIMIT", "3")]);
    for _ in 0..3 {
        assert_eq!(http_get(server.port, "/health").0, 200);
    }
    let (status, body) = http_get(server.port, "/health");
    assert_eq!(status, 429);
    assert_eq!(json(&body)["error"], "rate limit exceeded");
}

// ──────────────────────────────────────────────
// SQLite backend
// ──────────────────────────────────────────────

#[test]
fn sqlite_backend_keeps_decisions_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("promptgate.db");
    let config = dir.path().join("promptgate.toml");
    std::fs::write(
        &config,
        format!(
            "[store]\nbackend = \"sqlite\"\npath = {:?}\n",
            db.to_string_lossy()
        ),
    )
    .unwrap();

    {
        let server = start_server(Some(&config), &[]);
        assert_eq!(register(server.port, "p1", "1").0, 201);
        assert_eq!(
            http_get(server.port, "/reject?promptId=p1&version=1").0,
            200
        );
    }

    let server = start_server(Some(&config), &[]);
    let (status, body) = http_get(server.port, "/versions/p1/1");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "Rejected");
    let (status, _) = http_get(server.port, "/approve?promptId=p1&version=1");
    assert_eq!(status, 409);
}
