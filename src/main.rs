use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use axum::body::Body;
use axum::{routing::get, Router};
use http::StatusCode;
use tower::ServiceBuilder;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod middleware;
mod routes;
mod services;

use config::Config;
use services::automation::{AutomationService, AutomationSettings};
use services::clock::SystemClock;
use services::email::ResendGateway;
use services::init;
use services::store::SqliteAutomationStore;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub automation: Arc<AutomationService>,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> http::Response<Body> {
    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

/// Rate limit rejections in the cron endpoint's `{success, error}` shape.
fn governor_error_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut resp = json_response(
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "success": false,
                    "error": "Rate limit exceeded",
                    "retryAfterSeconds": wait_time,
                }),
            );
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut()
                .insert(http::header::RETRY_AFTER, http::HeaderValue::from(wait_time));
            resp
        }
        GovernorError::UnableToExtractKey => json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "success": false,
                "error": "Unable to determine client IP for rate limiting",
            }),
        ),
        GovernorError::Other { code, msg, headers } => {
            let status =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut resp = json_response(
                status,
                serde_json::json!({
                    "success": false,
                    "error": msg.unwrap_or_else(|| "Rate limiting error".to_string()),
                }),
            );
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "community_mailer=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting community mailer");

    let pool = init::init_db(&config).await?;

    let gateway = ResendGateway::new(&config.email)?;
    let automation = AutomationService::new(
        Arc::new(SqliteAutomationStore::new(pool.clone())),
        Arc::new(gateway),
        Arc::new(SystemClock),
        AutomationSettings::from_config(&config),
    );

    tracing::info!(
        "Reminder offsets {:?} days, due policy {:?}",
        config.automation.reminder_offsets,
        config.automation.due_policy
    );

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        automation: Arc::new(automation),
    });

    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
    let thread_shutdown = Arc::new(AtomicBool::new(false));

    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    let mut cron_builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    cron_builder.per_second(config.cron.per_second.max(1).into());
    cron_builder.burst_size(config.cron.burst.max(1));
    cron_builder.error_handler(governor_error_response);

    let cron_gov_conf = Arc::new(
        cron_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build cron governor config"))?,
    );

    // Limiter storage grows per client IP; prune it periodically.
    let cron_cleaner = {
        let limiter = cron_gov_conf.limiter().clone();
        let interval = Duration::from_secs(60);
        let flag = thread_shutdown.clone();
        std::thread::spawn(move || {
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..interval.as_secs() {
                    if flag.load(Ordering::SeqCst) {
                        tracing::info!("Cron rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("cron rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let cron_rate_layer = GovernorLayer {
        config: cron_gov_conf.clone(),
    };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/cron", routes::cron::router().layer(cron_rate_layer))
        .nest("/api/events", routes::emails::router())
        .with_state(app_state.clone())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(
                    middleware::security_headers::security_headers,
                )),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    // The server future is dropped once a shutdown signal arrives; workers and
    // the cleanup thread are notified first.
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let thread_shutdown_clone = thread_shutdown.clone();

    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM, listening for Ctrl+C only: {}", e);
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            }
        }

        tracing::info!("Shutdown signal received, notifying background workers");
        let _ = shutdown_tx_clone.send(());
        thread_shutdown_clone.store(true, Ordering::SeqCst);
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Server stopped accepting new connections");
        }
    }

    let shutdown_wait = Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for h in bg_handles {
            let _ = h.await;
        }
    };
    if tokio::time::timeout(shutdown_wait, bg_wait).await.is_err() {
        tracing::warn!("Background workers did not exit in time");
    }

    thread_shutdown.store(true, Ordering::SeqCst);
    if cron_cleaner.join().is_err() {
        tracing::warn!("Cron rate limiter cleanup thread panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
