use crate::{
    api,
    auth::{AuthConfig, AuthState},
    cli::telemetry,
    store::{MemoryStore, PgStore, Store},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be opened, the token secrets are
/// unusable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store: Arc<dyn Store> = match args.dsn.as_deref() {
        Some(dsn) => Arc::new(
            PgStore::connect(dsn)
                .await
                .context("Failed to open Postgres store")?,
        ),
        None => {
            warn!("No DSN configured; using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let config = AuthConfig::new(args.frontend_base_url)
        .with_access_ttl_seconds(args.access_ttl_seconds)
        .with_refresh_ttl_seconds(args.refresh_ttl_seconds);
    let auth_state = Arc::new(
        AuthState::new(
            config,
            &args.access_token_secret,
            &args.refresh_token_secret,
            store.clone(),
        )
        .context("Invalid token configuration")?,
    );

    let result = api::new(args.port, auth_state, store).await;
    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let storage = if args.dsn.is_some() {
        "postgres"
    } else {
        "memory"
    };
    info!(
        port = args.port,
        storage,
        frontend_base_url = %args.frontend_base_url,
        access_ttl_seconds = args.access_ttl_seconds,
        refresh_ttl_seconds = args.refresh_ttl_seconds,
        "Starting scribe"
    );
}
