use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use dripmail::config::EngineConfig;
use dripmail::dispatch;
use dripmail::relay::SmtpRelay;
use dripmail::routes::track_routes;
use dripmail::store::{Database, LibSqlBackend};
use dripmail::vault::Vault;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = EngineConfig::from_env().context("Loading configuration")?;
    let vault = Vault::from_base64_key(config.vault_key.expose_secret())
        .context("Initializing credential vault")?;

    eprintln!("📬 Dripmail v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Tracking: {}/track/{{lead}}/{{campaign}}", config.base_url);
    eprintln!("   Dispatch: cron '{}', batch {}", config.dispatch_cron, config.batch_size);

    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .context("Opening database")?,
    );

    // ── Tracking redirect server ─────────────────────────────────────
    let router = track_routes(Arc::clone(&store));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Tracking server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Tracking server error: {e}");
        }
    });

    // ── Dispatch loop ────────────────────────────────────────────────
    // Validated in EngineConfig::from_env.
    let schedule = cron::Schedule::from_str(&config.dispatch_cron).expect("dispatch cron");
    let relay = SmtpRelay;

    for next in schedule.upcoming(chrono::Utc) {
        let wait = (next - chrono::Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) =
            dispatch::run_pass(&store, &vault, &relay, &config.base_url, config.batch_size).await
        {
            tracing::error!("Dispatch pass failed: {e}");
        }
    }

    Ok(())
}
