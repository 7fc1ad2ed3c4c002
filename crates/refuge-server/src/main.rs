use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use refuge_api::auth::AccessPolicy;
use refuge_api::session::SessionStore;
use refuge_api::AppStateInner;
use refuge_notify::{Notifier, NotifyConfig};
use refuge_store::Storage;

/// Step-up PINs that MUST NOT be used.
const PLACEHOLDER_PINS: &[&str] = &["0000", "1234", "change-me"];

/// Uploads are capped below this; the headroom covers base64-inflated audio
/// payloads arriving inside JSON bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refuge=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let pin = std::env::var("REFUGE_REVIEW_PIN").unwrap_or_default();
    if pin.is_empty() || PLACEHOLDER_PINS.contains(&pin.as_str()) {
        eprintln!("FATAL: REFUGE_REVIEW_PIN is unset or still a placeholder.");
        eprintln!("       Privileged review access cannot be unlocked without it.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("REFUGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("REFUGE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path = std::env::var("REFUGE_DB_PATH").unwrap_or_else(|_| "refuge.db".into());
    let storage_dir: PathBuf = std::env::var("REFUGE_STORAGE_DIR")
        .unwrap_or_else(|_| "./attachments".into())
        .into();

    let allowed = email_set("REFUGE_ALLOWED_USERS");
    let reviewers = email_set("REFUGE_REVIEWER_EMAILS");
    let administrators = email_set("REFUGE_ADMIN_EMAILS");
    info!(
        "Access policy: {} allowed, {} reviewers, {} administrators",
        allowed.len(),
        reviewers.len(),
        administrators.len()
    );

    let allowed_exts = match std::env::var("REFUGE_ALLOWED_EXTENSIONS") {
        Ok(list) if !list.trim().is_empty() => list
            .split(',')
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect::<HashSet<_>>(),
        _ => Storage::default_extensions(),
    };

    let recipients: Vec<String> = reviewers.union(&administrators).cloned().collect();
    let notify_config = NotifyConfig {
        endpoint: std::env::var("REFUGE_MAIL_ENDPOINT").unwrap_or_default(),
        from: std::env::var("REFUGE_MAIL_FROM")
            .unwrap_or_else(|_| "refuge@localhost".into()),
        recipients,
    };

    // Init database and storage
    let db = refuge_db::Database::open(&PathBuf::from(&db_path))?;
    let storage = Storage::new(storage_dir, allowed_exts).await?;

    // Shared state
    let state = Arc::new(AppStateInner {
        db,
        storage,
        sessions: SessionStore::new(),
        policy: AccessPolicy {
            allowed,
            reviewers,
            administrators,
            pin,
        },
        notifier: Notifier::new(notify_config),
    });

    let app = refuge_api::router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Refuge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn email_set(var: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
