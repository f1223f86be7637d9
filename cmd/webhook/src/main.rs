use podgate_admission::{AdmissionConfig, Chain, Plugins};
use podgate_k8s_util::telemetry;

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, crate_authors, crate_description, crate_version};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustls::ServerConfig;
use rustls::crypto::aws_lc_rs::default_provider;
use rustls::pki_types::CertificateDer;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};

mod admission;
mod handlers;
mod state;

use state::WebhookState;

fn load_tls_config(cert_path: &PathBuf, key_path: &PathBuf) -> anyhow::Result<ServerConfig> {
    let cert_file = File::open(cert_path)?;
    let key_file = File::open(key_path)?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);

    let certs: Vec<CertificateDer> =
        rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;

    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow::anyhow!("No private key found in key file"))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(config)
}

/// Watch the given directories and call `on_change` once per burst of create/modify events,
/// after `settle` has passed. Returns when `shutdown` flips or its sender is dropped, releasing
/// the underlying watcher.
async fn watch_files<F>(
    dirs: Vec<PathBuf>,
    settle: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut on_change: F,
) where
    F: FnMut(),
{
    let (tx, mut rx) = mpsc::channel(1);

    let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                // A full channel already has a reload pending
                let _ = tx.try_send(());
            }
        }
    });
    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::error!("Failed to create TLS file watcher: {}", e);
            return;
        }
    };

    for dir in &dirs {
        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            tracing::error!("Failed to watch {}: {}", dir.display(), e);
        }
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = rx.recv() => {
                if event.is_none() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(settle) => {}
                }
                on_change();
            }
        }
    }

    drop(watcher);
    tracing::debug!("TLS file watcher stopped");
}

async fn watch_tls_files(
    cert_path: PathBuf,
    key_path: PathBuf,
    rustls_config: RustlsConfig,
    shutdown: watch::Receiver<bool>,
) {
    // Watch the parent directories to catch symlink updates of mounted secrets
    let mut dirs: Vec<PathBuf> = cert_path.parent().map(Path::to_path_buf).into_iter().collect();
    if let Some(dir) = key_path.parent().filter(|d| !dirs.iter().any(|c| c.as_path() == *d)) {
        dirs.push(dir.to_path_buf());
    }

    // Give the kubelet time to finish swapping both files
    watch_files(dirs, Duration::from_secs(5), shutdown, || {
        match load_tls_config(&cert_path, &key_path) {
            Ok(new_config) => {
                rustls_config.reload_from_config(Arc::new(new_config));
                tracing::info!("Successfully reloaded TLS certificates");
            }
            Err(e) => {
                tracing::error!("Failed to load new TLS config: {}", e);
            }
        }
    })
    .await;
}

#[derive(Parser, Debug)]
#[command(
    name = "podgate-webhook",
    about = crate_description!(),
    version = crate_version!(),
    author = crate_authors!("\n"),
)]
struct Args {
    /// Listen address (use "::" for IPv6, "0.0.0.0" for IPv4)
    #[arg(long, default_value = "0.0.0.0", env)]
    listen_address: String,

    /// Listen on given port
    #[arg(short, long, default_value_t = 8443, env)]
    port: u16,

    /// Set logging filter directive for `tracing_subscriber::filter::EnvFilter`. Example: "info,podgate_admission=debug"
    #[arg(short, long, default_value = "info", env)]
    log_filter: String,

    /// Set log format
    #[arg(long, value_enum, default_value_t = telemetry::LogFormat::Text, env)]
    log_format: telemetry::LogFormat,

    /// URL for the OpenTelemetry tracing endpoint.
    ///
    /// This optional argument specifies the URL to which traces will be sent using
    /// OpenTelemetry. If not provided, tracing will be disabled.
    #[arg(short, long, env = "OPENTELEMETRY_ENDPOINT_URL")]
    tracing_url: Option<String>,

    /// Sampling ratio for tracing.
    ///
    /// Specifies the ratio of traces to sample. A value of `1.0` will sample all traces,
    /// while a lower value will sample fewer traces. The default is `0.1`, meaning 10%
    /// of traces are sampled.
    #[arg(short, long, default_value_t = 0.1, env)]
    sample_ratio: f64,

    /// Path to the admission configuration file (YAML or JSON) listing the enabled plugins
    #[arg(short, long, env = "ADMISSION_CONFIG", required = true)]
    admission_config: PathBuf,

    /// Path to TLS certificate file
    #[arg(long, env, required = true)]
    tls_cert: PathBuf,

    /// Path to TLS private key file
    #[arg(long, env, required = true)]
    tls_key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let args: Args = Args::parse();

    telemetry::init(
        &args.log_filter,
        args.log_format,
        args.tracing_url.as_deref(),
        args.sample_ratio,
    )
    .await?;

    let config = AdmissionConfig::from_file(&args.admission_config)?;
    let chain = Chain::from_config(&config, &Plugins::default())?;
    if chain.is_empty() {
        tracing::warn!("No admission plugins configured, every request will be allowed");
    }
    tracing::info!(plugins = ?chain.plugin_names(), "Admission chain ready");

    let state = WebhookState::new(chain);
    let app = handlers::router(state.clone());

    let addr = format!("{}:{}", args.listen_address, args.port);
    let socket_addr: SocketAddr = addr.parse()?;

    tracing::info!("Starting HTTPS server on {}", socket_addr);
    let tls_config = load_tls_config(&args.tls_cert, &args.tls_key)?;
    let rustls_config = RustlsConfig::from_config(Arc::new(tls_config));

    let handle: Handle = Handle::new();
    let shutdown_handle = handle.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        shutdown_signal().await;
        state.set_not_ready();
        tracing::info!("Received shutdown signal, starting graceful shutdown");
        let _ = shutdown_tx.send(true);
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
    });

    tokio::spawn(watch_tls_files(
        args.tls_cert.clone(),
        args.tls_key.clone(),
        rustls_config.clone(),
        shutdown_rx,
    ));

    axum_server::bind_rustls(socket_addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM signal handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_watcher_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();

        let task = tokio::spawn(watch_files(
            vec![dir.path().to_path_buf()],
            Duration::from_secs(5),
            shutdown_rx,
            move || {
                counter.fetch_add(1, Ordering::Relaxed);
            },
        ));

        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop after shutdown")
            .unwrap();
        assert_eq!(changes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_watcher_stops_when_shutdown_sender_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(watch_files(
            vec![dir.path().to_path_buf()],
            Duration::ZERO,
            shutdown_rx,
            || {},
        ));
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher did not stop after shutdown sender dropped")
            .unwrap();
    }
}
