//! Connectivity probe.
//!
//! Periodically opens a TCP connection to the configured host and feeds the
//! result into the shared [`ConnectivitySignal`].

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use wayfarer_chat::ConnectivitySignal;
use wayfarer_core::config::NetworkConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a TCP connection to `host:port` succeeds within `timeout`.
pub async fn probe_once(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "Connectivity probe failed");
            false
        }
        Err(_) => {
            debug!(host, port, "Connectivity probe timed out");
            false
        }
    }
}

/// Run the probe loop in the background until the handle is aborted.
pub fn spawn_probe(signal: ConnectivitySignal, config: NetworkConfig) -> JoinHandle<()> {
    let interval_secs = config.probe_interval_secs.max(1);
    info!(
        host = %config.probe_host,
        port = config.probe_port,
        interval_secs,
        "Connectivity probe started"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let online = probe_once(&config.probe_host, config.probe_port, CONNECT_TIMEOUT).await;
            signal.set_online(online);
        }
    })
}
