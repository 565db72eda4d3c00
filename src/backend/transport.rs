// src/backend/transport.rs - Primary/fallback transport selection
use super::{HttpBackend, ProxyBackend, RobotBackend, SimulatedBackend, TransportError};
use crate::config::{Config, TransportMode};
use crate::kinematics::KinematicTable;
use std::sync::Arc;
use std::time::Duration;

/// One short read against the robot API.
pub async fn probe(backend: &dyn RobotBackend, timeout: Duration) -> Result<(), TransportError> {
    match tokio::time::timeout(timeout, backend.positions()).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

/// Build the backend for the configured mode. In `auto` mode the robot API is
/// probed once; any failure switches to the proxy for the rest of the session.
pub async fn connect(config: &Config, table: Arc<KinematicTable>) -> Arc<dyn RobotBackend> {
    let timeout = Duration::from_millis(config.robot.request_timeout_ms);
    match config.transport.mode {
        TransportMode::Http => Arc::new(HttpBackend::new(&config.robot.base_url, timeout)),
        TransportMode::Proxy => Arc::new(ProxyBackend::spawn(&config.proxy, table)),
        TransportMode::Sim => Arc::new(SimulatedBackend::new(table)),
        TransportMode::Auto => {
            let http = HttpBackend::new(&config.robot.base_url, timeout);
            let probe_timeout = Duration::from_millis(config.transport.probe_timeout_ms);
            match probe(&http, probe_timeout).await {
                Ok(()) => {
                    tracing::info!("Robot API reachable at {}, using direct HTTP", config.robot.base_url);
                    Arc::new(http)
                }
                Err(e) => {
                    tracing::warn!(
                        "Robot API probe failed ({}), falling back to proxy at {}",
                        e,
                        config.proxy.url
                    );
                    Arc::new(ProxyBackend::spawn(&config.proxy, table))
                }
            }
        }
    }
}
