//! Signal handling for graceful shutdown and config reload.

use crate::config::{ConfigLoader, LoadedConfig};
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::Notify;

/// Wait for the next delivery. A handler that failed to install never fires.
async fn recv_signal(stream: &mut Option<Signal>) {
    match stream {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

fn install(kind: SignalKind, name: &str) -> Option<Signal> {
    signal(kind)
        .map_err(|e| tracing::error!(error = %e, "Failed to install {} handler", name))
        .ok()
}

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM");
    let mut sigint = install(SignalKind::interrupt(), "SIGINT");

    tokio::select! {
        _ = recv_signal(&mut sigterm) => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = recv_signal(&mut sigint) => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Swap the reloadable parts of a freshly loaded config into the live state.
///
/// The listen address and gateway credentials need a restart.
pub async fn apply_reload(state: &AppState, loaded: LoadedConfig) {
    state.session.update(loaded.session).await;
    state.engine.policy().update(loaded.policy).await;
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = install(SignalKind::hangup(), "SIGHUP");

        loop {
            tokio::select! {
                _ = recv_signal(&mut sighup) => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            apply_reload(&state, loaded_config).await;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::config::file::FileConfig;
    use crate::config::{KeyOverrides, build_loaded_config};
    use std::time::Duration;

    #[tokio::test]
    async fn test_reload_swaps_policy_and_session() {
        let state = test_state();
        let mut watcher = state.engine.policy().subscribe();
        let file: FileConfig = toml::from_str(
            r#"
[session]
secret = "rotated-secret"

[marketplace]
shipping_fee = "55"
sweep_interval_secs = 15
sandbox = true

[gateway]
public_key = "pkey_test"
secret_key = "skey_test"
"#,
        )
        .unwrap();
        let loaded = build_loaded_config(file, KeyOverrides::default()).unwrap();

        apply_reload(&state, loaded).await;

        watcher.changed().await.unwrap();
        let policy = state.engine.policy().snapshot().await;
        assert_eq!(policy.shipping_fee, rust_decimal::Decimal::from(55));
        assert_eq!(policy.sweep_interval, Duration::from_secs(15));
        assert!(policy.sandbox);
        assert_eq!(&*state.session.read().await.secret, b"rotated-secret");
    }
}
