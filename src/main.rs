use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use rescache::config::ResourceConfig;
use rescache::manager::ResourceManager;
use rescache::model::{Resource, ResourceEventKind};
use rescache::notify::NotifyHub;
use rescache::source::ResourceSource;

/// `RESCACHE_SOURCE_FILE` (a JSON source document) wins over
/// `RESCACHE_SOURCE`, which is either inline JSON or a URL.
fn load_source() -> Result<ResourceSource, Box<dyn std::error::Error>> {
    if let Ok(path) = std::env::var("RESCACHE_SOURCE_FILE") {
        let text = std::fs::read_to_string(&path)?;
        return Ok(ResourceSource::from_value(serde_json::from_str(&text)?));
    }
    let raw = std::env::var("RESCACHE_SOURCE").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        Ok(ResourceSource::Empty)
    } else if raw.starts_with('[') || raw.starts_with('{') {
        Ok(ResourceSource::from_value(serde_json::from_str(raw)?))
    } else {
        Ok(ResourceSource::from(raw))
    }
}

fn log_tree(resources: &[Resource], depth: usize) {
    for r in resources {
        info!(
            "{:indent$}{} {}",
            "",
            r.id,
            r.title.as_deref().unwrap_or(""),
            indent = depth * 2
        );
        log_tree(&r.children, depth + 1);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("RESCACHE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    rescache::observability::init(metrics_port)?;

    let refresh_secs: Option<u64> = std::env::var("RESCACHE_REFRESH_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&s| s > 0);

    let config = ResourceConfig::from_env();
    let source = load_source()?;
    info!("rescache starting");
    info!("  source: {source:?}");
    info!("  timezone: {}", config.effective_timezone().unwrap_or("local"));
    info!("  refresh: {}", refresh_secs.map_or("disabled".to_string(), |s| format!("every {s}s")));

    let manager = ResourceManager::new(source, config, Arc::new(NotifyHub::new()));
    let resources = manager.get_or_fetch(None).await?;
    info!("loaded {} resources", manager.resource_count());
    log_tree(&resources, 0);

    let Some(secs) = refresh_secs else {
        return Ok(());
    };

    let mut reloads = manager.notify().subscribe(ResourceEventKind::Reset);
    let refresher = tokio::spawn(rescache::refresh::run_refresher(
        manager.clone(),
        Duration::from_secs(secs),
    ));

    // Stop on SIGTERM/ctrl-c
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = reloads.recv() => match event {
                Ok(event) => {
                    info!("resources reloaded, {} top-level", event.resources().len());
                    log_tree(event.resources(), 1);
                }
                Err(RecvError::Lagged(n)) => tracing::warn!("missed {n} reload notifications"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    refresher.abort();
    info!("rescache stopped");
    Ok(())
}
