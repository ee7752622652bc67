use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A config pointing every path into `dir` and the library at a closed port.
fn minimal_config(dir: &Path, port: u16) -> String {
    format!(
        r#"
[library]
url = "http://127.0.0.1:9"
token = "super-secret"
sections = ["1"]

[database]
path = "{db}"

[transcoder]
cache_dir = "{cache}"

[audit]
path = "{audit}"

[server]
host = "127.0.0.1"
port = {port}
"#,
        db = dir.join("library.db").display(),
        cache = dir.join("cache").display(),
        audit = dir.join("audit.db").display(),
        port = port,
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn command(config_path: &Path) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_grinder"));
    cmd.env("GRINDER_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true);
    cmd
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

struct Running {
    _dir: TempDir,
    _config: NamedTempFile,
    child: tokio::process::Child,
    port: u16,
}

impl Running {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let port = get_available_port();
        let config = write_config(&minimal_config(dir.path(), port));
        let child = command(config.path()).spawn().unwrap();
        assert!(
            wait_for_server(port, 100).await,
            "Server did not start in time"
        );
        Self {
            _dir: dir,
            _config: config,
            child,
            port,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn stop(mut self) {
        self.child.kill().await.unwrap();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = Running::start().await;

    let response = Client::new()
        .get(server.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.stop().await;
}

#[tokio::test]
async fn test_config_endpoint_hides_token() {
    let server = Running::start().await;

    let response = Client::new()
        .get(server.url("/api/v1/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(!text.contains("super-secret"));

    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["library"]["token_configured"], true);
    assert_eq!(body["server"]["port"], server.port);

    server.stop().await;
}

#[tokio::test]
async fn test_status_endpoint_reports_phase() {
    let server = Running::start().await;

    let response = Client::new()
        .get(server.url("/api/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["phase"].is_string());
    assert_eq!(body["readonly"], false);

    server.stop().await;
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = Running::start().await;

    let response = Client::new()
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("grinder_orchestrator_phase"));

    server.stop().await;
}

#[tokio::test]
async fn test_missing_config_exits_with_error() {
    let dir = TempDir::new().unwrap();
    let status = timeout(
        Duration::from_secs(10),
        command(&dir.path().join("absent.toml")).status(),
    )
    .await
    .expect("process did not exit")
    .unwrap();
    assert!(!status.success());
}

#[test]
fn test_invalid_config_exits_with_error() {
    // No library section and a transcoder pool of zero.
    let config = write_config("[pools]\ntranscoders = 0\n");
    let status = tokio_test::block_on(async {
        timeout(Duration::from_secs(10), command(config.path()).status()).await
    })
    .expect("process did not exit")
    .unwrap();
    assert!(!status.success());
}
