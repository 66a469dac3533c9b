#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::process::Stdio;
    use std::sync::{Arc, Mutex, OnceLock};
    use std::time::Duration;

    use anyhow::{Context, Result, bail};
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use client_sdk::StatusClient;
    use serde_json::{Value, json};
    use tokio::process::{Child, Command};
    use tokio::time::sleep;
    use view_core::{CycleOutcome, StatusPoller, run_cycle};
    use web_ui::HtmlContainer;

    const STATUS_ROUTE: &str = "/plugins/multi-master/status/json/";

    #[derive(Debug, Clone)]
    enum StubReply {
        Document(Value),
        Failure(StatusCode),
        Garbage,
    }

    #[derive(Clone)]
    struct StubEndpoint {
        addr: SocketAddr,
        reply: Arc<Mutex<StubReply>>,
    }

    impl StubEndpoint {
        fn page_url(&self) -> String {
            format!("http://{}/plugins/multi-master/static/index.html", self.addr)
        }

        fn status_url(&self) -> String {
            format!("http://{}{STATUS_ROUTE}", self.addr)
        }

        fn set_reply(&self, reply: StubReply) {
            *self.reply.lock().unwrap() = reply;
        }
    }

    async fn serve_status(State(reply): State<Arc<Mutex<StubReply>>>) -> impl IntoResponse {
        let reply = reply.lock().unwrap().clone();
        match reply {
            StubReply::Document(value) => (StatusCode::OK, value.to_string()).into_response(),
            StubReply::Failure(status) => status.into_response(),
            StubReply::Garbage => (StatusCode::OK, "{\"outdatedThreshold\":").into_response(),
        }
    }

    async fn start_stub(reply: StubReply) -> Result<StubEndpoint> {
        let reply = Arc::new(Mutex::new(reply));
        let app = Router::new()
            .route(STATUS_ROUTE, get(serve_status))
            .with_state(reply.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(StubEndpoint { addr, reply })
    }

    fn now_millis() -> i64 {
        view_core::now_millis()
    }

    fn peer(id: &str, host: &str, port: &str) -> Value {
        json!({
            "id": {"string": id},
            "properties": {
                "receiveHost": {"string": format!("\"{host}\""), "type": "java.lang.String"},
                "receivePort": {"string": format!("\"{port}\""), "type": "java.lang.String"}
            }
        })
    }

    fn status_document(evicted_key: &str) -> Value {
        let now = now_millis();
        json!({
            "outdatedThreshold": 60000,
            "self": peer("A", "10.0.0.1", "9000"),
            "activities": [
                {"peer": peer("C", "10.0.0.3", "9002"), "lastSeen": now - 600_000},
                {"peer": peer("B", "10.0.0.2", "9001"), "lastSeen": now - 1_000}
            ],
            "recentEvicts": [
                {"pluginName": "cacheA", "cacheName": "c1", "key": evicted_key},
                {"pluginName": "gerrit", "cacheName": "accounts", "key": "1000096"}
            ]
        })
    }

    #[tokio::test]
    async fn client_resolves_status_path_from_page_url() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("k1"))).await?;

        let client = StatusClient::for_page(&stub.page_url())?;
        assert_eq!(client.status_url().as_str(), stub.status_url());

        let document = client.fetch().await?;
        assert_eq!(document.self_peer.id.as_str(), "A");
        assert_eq!(document.activities.len(), 2);
        assert_eq!(document.recent_evicts[0].key, "k1");
        assert_eq!(document.activities[1].peer.receive_port()?, "9001");
        Ok(())
    }

    #[tokio::test]
    async fn client_reports_error_status_and_malformed_body() -> Result<()> {
        let stub = start_stub(StubReply::Failure(StatusCode::SERVICE_UNAVAILABLE)).await?;
        let client = StatusClient::new(&stub.status_url())?;

        let err = client.fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("error status"));

        stub.set_reply(StubReply::Garbage);
        let err = client.fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to decode status document"));
        Ok(())
    }

    #[tokio::test]
    async fn cycle_renders_into_container_and_keeps_it_on_failure() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("k1"))).await?;
        let client = StatusClient::new(&stub.status_url())?;
        let container = HtmlContainer::new();

        let outcome = run_cycle(&client, &container, Duration::from_secs(5)).await;
        assert_eq!(
            outcome,
            CycleOutcome::Rendered {
                peers: 3,
                evictions: 2
            }
        );
        let rendered = container.contents();
        let fresh_b = rendered
            .find("<tr style=\"background-color: #B6DB49\"><td>0</td><td>B</td>")
            .context("fresh row for B missing")?;
        let stale_c = rendered
            .find("<tr style=\"background-color: #FF7979\"><td>1</td><td>C</td>")
            .context("outdated row for C missing")?;
        assert!(fresh_b < stale_c);
        assert!(rendered.contains("<tr><td>cacheA</td><td>c1</td><td>k1</td></tr>"));

        stub.set_reply(StubReply::Failure(StatusCode::INTERNAL_SERVER_ERROR));
        let outcome = run_cycle(&client, &container, Duration::from_secs(5)).await;
        assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
        assert_eq!(container.contents(), rendered);

        stub.set_reply(StubReply::Document(status_document("k2")));
        run_cycle(&client, &container, Duration::from_secs(5)).await;
        let replaced = container.contents();
        assert!(replaced.contains("<td>k2</td>"));
        assert!(!replaced.contains("<td>k1</td>"));
        assert_eq!(replaced.matches("<td>Self</td>").count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn poller_refreshes_container_from_live_endpoint() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("first"))).await?;
        let client = StatusClient::new(&stub.status_url())?;
        let container = HtmlContainer::new();

        let handle = StatusPoller::new(client, container.clone())
            .with_interval(Duration::from_millis(25))
            .start();

        wait_for_contents(&container, "<td>first</td>", 80).await?;
        stub.set_reply(StubReply::Document(status_document("second")));
        wait_for_contents(&container, "<td>second</td>", 80).await?;

        handle.stop().await;
        assert!(!container.contents().contains("<td>first</td>"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_show_prints_status_tables() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("k1"))).await?;

        let output = run_cli(&["--page-url", &stub.page_url(), "show"]).await?;
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with('#'));
        assert!(lines[1].starts_with("Self | A"));
        assert!(lines[2].starts_with("0    | B"));
        assert!(lines[3].starts_with("1    | C"));
        assert!(output.contains("cacheA | c1"));

        let html = run_cli(&["--status-url", &stub.status_url(), "show", "--html"]).await?;
        assert!(html.contains("<td>Self</td><td>A</td><td>-</td><td>10.0.0.1</td><td>9000</td>"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_show_fails_when_endpoint_is_down() -> Result<()> {
        let stub = start_stub(StubReply::Failure(StatusCode::BAD_GATEWAY)).await?;

        let result = run_cli(&["--status-url", &stub.status_url(), "show"]).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn cli_status_json_prints_raw_document() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("raw-key"))).await?;

        let output = run_cli(&["--status-url", &stub.status_url(), "status-json"]).await?;
        let parsed: Value = serde_json::from_str(&output)?;
        assert_eq!(parsed["recentEvicts"][0]["key"], "raw-key");
        assert_eq!(parsed["outdatedThreshold"], 60000);
        Ok(())
    }

    #[tokio::test]
    async fn cli_web_page_serves_wrapper() -> Result<()> {
        let stub = start_stub(StubReply::Document(status_document("web-key"))).await?;
        let bind = "127.0.0.1:19182";
        let mut viewer = start_cli_web(bind, &stub.status_url()).await?;

        let result = async {
            let http = reqwest::Client::new();
            let wrapper_url = format!("http://{bind}/wrapper");
            let mut fragment = String::new();
            for _ in 0..60 {
                fragment = http
                    .get(&wrapper_url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                if fragment.contains("<td>web-key</td>") {
                    break;
                }
                sleep(Duration::from_millis(100)).await;
            }
            assert!(fragment.contains("<td>web-key</td>"));

            let page = http
                .get(format!("http://{bind}/"))
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            assert!(page.contains("<div id=\"wrapper\">"));

            Ok::<(), anyhow::Error>(())
        }
        .await;

        stop_process(&mut viewer).await;
        result
    }

    async fn wait_for_contents(
        container: &HtmlContainer,
        needle: &str,
        retries: usize,
    ) -> Result<()> {
        for _ in 0..retries {
            if container.contents().contains(needle) {
                return Ok(());
            }
            sleep(Duration::from_millis(25)).await;
        }

        bail!("container never contained {needle}");
    }

    async fn run_cli(args: &[&str]) -> Result<String> {
        let cli_bin = binary_path("status-viewer")?;
        let output = Command::new(cli_bin)
            .args(args)
            .output()
            .await
            .context("failed to execute status-viewer")?;

        if !output.status.success() {
            bail!(
                "status-viewer failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn start_cli_web(bind: &str, status_url: &str) -> Result<Child> {
        let cli_bin = binary_path("status-viewer")?;

        let child = Command::new(cli_bin)
            .arg("--status-url")
            .arg(status_url)
            .arg("serve-web")
            .arg("--bind")
            .arg(bind)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn status-viewer serve-web")?;

        wait_for_url_status(&format!("http://{bind}/api/ping"), StatusCode::OK, 40).await?;
        Ok(child)
    }

    async fn wait_for_url_status(url: &str, expected: StatusCode, retries: usize) -> Result<()> {
        let http = reqwest::Client::new();

        for _ in 0..retries {
            if let Ok(resp) = http.get(url).send().await
                && resp.status() == expected
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }

        bail!("service did not return {expected} at {url}");
    }

    async fn stop_process(child: &mut Child) {
        let _ = child.kill().await;
        let _ = child.wait().await;
    }

    fn binary_path(name: &str) -> Result<PathBuf> {
        let workspace_root = workspace_root()?;
        ensure_binaries_built(&workspace_root)?;
        let mut path = workspace_root.join("target").join("debug").join(name);

        if let Some(suffix) = std::env::consts::EXE_SUFFIX.strip_prefix('.') {
            let mut filename = OsString::from(name);
            filename.push(".");
            filename.push(suffix);
            path = workspace_root.join("target").join("debug").join(filename);
        }

        if !path.exists() {
            bail!("expected binary does not exist: {}", path.display());
        }

        Ok(path)
    }

    fn workspace_root() -> Result<PathBuf> {
        let crate_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        crate_dir
            .parent()
            .and_then(|p| p.parent())
            .map(PathBuf::from)
            .context("failed to resolve workspace root")
    }

    fn build_required_binaries(workspace_root: &PathBuf) -> Result<()> {
        let status = std::process::Command::new("cargo")
            .arg("build")
            .arg("-p")
            .arg("status-viewer")
            .current_dir(workspace_root)
            .status()
            .context("failed to run cargo build for system test binaries")?;

        if !status.success() {
            bail!("cargo build for system test binaries failed");
        }

        Ok(())
    }

    fn ensure_binaries_built(workspace_root: &PathBuf) -> Result<()> {
        static BUILD_RESULT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

        let result = BUILD_RESULT.get_or_init(|| {
            build_required_binaries(workspace_root).map_err(|err| err.to_string())
        });

        if let Err(message) = result {
            bail!("failed to build required binaries: {message}");
        }

        Ok(())
    }
}
