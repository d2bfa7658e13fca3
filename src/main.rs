use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use todo_chat::agent::AgentClient;
use todo_chat::api;
use todo_chat::config::{AppConfig, StoreBackend};
use todo_chat::http::{HttpClient, ReqwestHttpClient};
use todo_chat::notify::LogNotifier;
use todo_chat::poller;
use todo_chat::session::SessionSlot;
use todo_chat::store::{JsonFileStore, RestTaskStore, TaskStore};
use todo_chat::viewmodel::ChatViewModel;
use todo_chat::voice::TranscriptFeed;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let session = Arc::new(SessionSlot::from_token(
        config.access_token.clone(),
        config.user_id.clone(),
    ));
    if config.access_token.is_none() {
        warn!("TODO_CHAT_ACCESS_TOKEN is not set; requests will be answered as signed out");
    }

    let store: Arc<dyn TaskStore> = match &config.store {
        StoreBackend::File { path } => {
            info!(path = %path.display(), "using local task store");
            Arc::new(JsonFileStore::new(path.clone(), session.clone()))
        }
        StoreBackend::Rest { url, api_key } => {
            info!(url = %url, "using hosted task store");
            Arc::new(RestTaskStore::new(
                http.clone(),
                url.clone(),
                api_key.clone(),
                session.clone(),
            ))
        }
    };

    let (voice, transcripts) = TranscriptFeed::new();
    let vm = Arc::new(ChatViewModel::new(
        AgentClient::new(http, config.api_url.clone(), session),
        store,
        Arc::new(voice),
        Arc::new(LogNotifier),
        config.scheduler_settings(),
    ));

    vm.load_history().await;
    if !vm.refresh_tasks().await {
        warn!("initial task load failed; starting with an empty list");
    }

    let cancel = CancellationToken::new();
    let alarms = poller::spawn_alarm_poller(vm.clone(), config.poll_interval, cancel.clone());
    let pump = poller::spawn_voice_pump(vm.clone(), transcripts, cancel.clone());

    let app = api::router(vm.clone(), &config.static_dir);
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    info!(
        address = %config.bind,
        static_dir = %config.static_dir.display(),
        agent = %config.api_url,
        "todo-chat starting"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("todo-chat server failed")?;

    cancel.cancel();
    vm.stop_voice();
    let _ = tokio::join!(alarms, pump);
    info!("todo-chat stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for Ctrl-C");
                // keep serving; shutdown can still come through the token
                cancel.cancelled().await;
            }
            info!("shutdown requested");
            cancel.cancel();
        }
    }
}
