use devcamper_server::config::{Config, TlsConfig};
use devcamper_server::{geocoder, metrics, router, AppState};
use devcamper_storage::{DocumentStore, InMemoryStore, PersistentStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let store = open_store(&config);

    let state = AppState {
        store,
        geocoder: geocoder::from_config(&config.geocoder)?,
        geocode_timeout: config.geocoder.timeout,
    };
    let app = router(state);
    let addr = config.socket_addr()?;

    match &config.tls {
        Some(TlsConfig {
            cert_path,
            key_path,
        }) => {
            let tls =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
            info!(%addr, "https listening");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "http listening");
            axum_server::bind(addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}

fn open_store(config: &Config) -> Arc<dyn DocumentStore> {
    let Some(dir) = &config.data_dir else {
        info!("DATA_DIR not set, using in-memory store");
        return Arc::new(InMemoryStore::new());
    };
    match PersistentStore::open(dir) {
        Ok(p) => {
            let p = Arc::new(p);
            spawn_snapshotter(p.clone(), config.snapshot_interval);
            p
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "persistent open failed, falling back to memory");
            Arc::new(InMemoryStore::new())
        }
    }
}

/// Periodic snapshot + WAL rotation. Runs on the blocking pool since it does
/// file IO while holding the WAL lock.
fn spawn_snapshotter(store: Arc<PersistentStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = store.clone();
            let t0 = Instant::now();
            let res = tokio::task::spawn_blocking(move || s.snapshot()).await;
            metrics::SNAPSHOT_DURATION_SEC.observe(t0.elapsed().as_secs_f64());
            match res {
                Ok(Ok(m)) => {
                    metrics::SNAPSHOT_TOTAL.with_label_values(&["ok"]).inc();
                    info!(documents = m.documents, "periodic snapshot");
                }
                Ok(Err(e)) => {
                    metrics::SNAPSHOT_TOTAL.with_label_values(&["error"]).inc();
                    error!(error = %e, "snapshot failed");
                }
                Err(e) => {
                    metrics::SNAPSHOT_TOTAL.with_label_values(&["error"]).inc();
                    error!(error = %e, "snapshot task panicked");
                }
            }
        }
    });
}
