use anyhow::Result;
use photo_store::{
    auth::TokenCodec, config::AppConfig, db, routes::routes::routes, state::AppState,
    storage::{BucketPolicy, LocalObjectStore},
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-store with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection + schema ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize services ---
    let objects = Arc::new(LocalObjectStore::new(
        cfg.storage_dir.clone(),
        cfg.public_base_url.clone(),
        cfg.url_signing_secret.as_bytes().to_vec(),
    ));
    let tokens = Arc::new(TokenCodec::new(cfg.jwt_secret.as_bytes()));
    let state = AppState::new(db, objects, tokens, BucketPolicy::new(cfg.public_bucket.clone()));

    // --- Settle visibility changes interrupted by a previous crash ---
    match state.photos.reconcile_pending().await {
        Ok(0) => {}
        Ok(settled) => tracing::info!("Settled {} interrupted visibility changes", settled),
        Err(err) => tracing::error!("Reconciliation of visibility changes failed: {}", err),
    }

    // --- Build router ---
    let app = routes(state, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
