use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use client_sdk::StatusClient;
use tracing::info;
use tracing_subscriber::EnvFilter;
use view_core::{StatusPoller, StatusView, now_millis};
use web_ui::{HtmlContainer, page_html, render_text, tables_html};

mod config;

use config::ViewerConfig;

#[derive(Clone)]
struct WebState {
    container: HtmlContainer,
}

#[derive(Debug, Parser)]
#[command(name = "status-viewer")]
#[command(about = "Peer replication and cache eviction status for multi-master nodes")]
struct Cli {
    /// URL of the plugin status page; the document is read from `../status/json/`.
    #[arg(long)]
    page_url: Option<String>,
    /// Full URL of the status document, bypassing page-relative resolution.
    #[arg(long)]
    status_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Show {
        #[arg(long)]
        html: bool,
    },
    StatusJson,
    ServeWeb {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = ViewerConfig::from_env()?.apply_overrides(
        cli.page_url.clone(),
        cli.status_url.clone(),
        cli.timeout_ms,
    );
    let client = config.status_client()?;

    match cli.command {
        Commands::Show { html } => {
            let view = fetch_view(&client).await?;
            if html {
                println!("{}", tables_html(&view));
            } else {
                print!("{}", render_text(&view));
            }
        }
        Commands::StatusJson => {
            let value = client.fetch_raw().await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::ServeWeb { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            serve_web(&config, client).await?;
        }
    }

    Ok(())
}

async fn fetch_view(client: &StatusClient) -> Result<StatusView> {
    let document = client.fetch().await?;
    StatusView::build(&document, now_millis())
        .with_context(|| format!("failed to render status from {}", client.status_url()))
}

async fn serve_web(config: &ViewerConfig, client: StatusClient) -> Result<()> {
    let bind_addr = config.bind_addr()?;
    let container = HtmlContainer::new();
    let status_url = client.status_url().to_string();

    let poller = StatusPoller::new(client, container.clone())
        .with_request_timeout(config.request_timeout)
        .start();

    let app = Router::new()
        .route("/", get(index))
        .route("/wrapper", get(wrapper))
        .route(
            "/api/ping",
            get(|| async {
                Json(serde_json::json!({
                    "ok": true,
                    "service": "status-viewer"
                }))
            }),
        )
        .with_state(WebState { container });

    info!(%bind_addr, %status_url, "status page listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop().await;
    Ok(())
}

async fn index(State(state): State<WebState>) -> Html<String> {
    Html(page_html(&state.container))
}

async fn wrapper(State(state): State<WebState>) -> Html<String> {
    Html(state.container.contents())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down status page");
}
