//! Shared HTTP transport for every ML-service client.
//!
//! One pooled client per engine: reusing TCP connections and TLS sessions
//! across the intent, safeguard, and embedding clients keeps the latency
//! budget intact. Pool settings: 10 idle connections per host, 90 s idle
//! timeout, 30 s TCP keep-alive.

use std::time::Duration;

/// Build the shared pooled client.
pub fn shared_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}
