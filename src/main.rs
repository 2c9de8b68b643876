mod backend;
mod components;
mod pages;
mod routes;
mod services;
mod state;

use backend::config::BackendConfig;
use services::auth::{AuthRedirects, AuthStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = BackendConfig::from_env().expect("backend configuration");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let backend = backend::connect(&config).expect("backend client init failed");
    let auth = AuthStore::new(backend.clone(), AuthRedirects::from_config(&config));
    // The session listener lives exactly as long as the server.
    auth.init();
    let session = auth.wait_until_loaded().await;
    tracing::info!(signed_in = session.user.is_some(), "initial session resolved");

    let state = state::AppState::new(backend, auth.clone(), &config.avatar_bucket);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, backend = %config.url, "profile portal listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    auth.teardown();
    tracing::info!("profile portal stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
