//! homedash agent - pushes host metrics to the homedash kernel
//!
//! Every `HOMEDASH_INTERVAL_SECS` the agent samples CPU, memory and disks and
//! POSTs a telegraf-shaped payload to `/api/telegraf/ingest`, identified by
//! `x-node-id`. Failed pushes are logged and retried on the next tick.

mod config;
mod metrics;

use anyhow::{Context, Result};
use config::AgentConfig;
use metrics::{Payload, Snapshot};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

struct Pusher {
    http: reqwest::Client,
    config: AgentConfig,
}

impl Pusher {
    async fn push(&self, payload: &Payload) -> Result<()> {
        let mut request = self
            .http
            .post(self.config.ingest_url())
            .header("x-node-id", &self.config.node_id)
            .json(payload);
        if let Some(key) = &self.config.ingestion_key {
            request = request.header("x-ingestion-key", key);
        }
        request
            .send()
            .await
            .context("sending metrics")?
            .error_for_status()
            .context("kernel rejected metrics")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("homedash_agent=info")),
        )
        .init();

    let config = AgentConfig::from_env()?;
    info!(
        node = %config.node_id,
        url = %config.ingest_url(),
        every_secs = config.interval.as_secs(),
        "homedash agent starting"
    );

    let pusher = Pusher {
        http: reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .user_agent(concat!("homedash-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?,
        config,
    };

    run(&pusher, tokio::signal::ctrl_c()).await;
    Ok(())
}

/// Push loop; `shutdown` is polled across ticks so a signal during a sample or send still stops it
async fn run<S>(pusher: &Pusher, shutdown: S)
where
    S: Future,
{
    tokio::pin!(shutdown);
    let mut ticker = interval(pusher.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                return;
            }
            _ = push_once(pusher, ticker.tick()) => {}
        }
    }
}

async fn push_once(pusher: &Pusher, tick: impl Future) {
    tick.await;
    let payload = Snapshot::collect().await.to_payload();
    match pusher.push(&payload).await {
        Ok(()) => debug!(measurements = payload.metrics.len(), "metrics pushed"),
        Err(e) => warn!(error = %format!("{e:#}"), "push failed, retrying next tick"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pusher(url: String, key: Option<&str>) -> Pusher {
        Pusher {
            http: reqwest::Client::new(),
            config: AgentConfig {
                server_url: url,
                node_id: "nas".into(),
                ingestion_key: key.map(String::from),
                interval: Duration::from_secs(10),
            },
        }
    }

    #[tokio::test]
    async fn test_push_sends_identity_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telegraf/ingest"))
            .and(header("x-node-id", "nas"))
            .and(header("x-ingestion-key", "s3cret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let payload = Snapshot::default().to_payload();
        pusher(server.uri(), Some("s3cret")).push(&payload).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_slow_push() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let pusher = pusher(server.uri(), None);
        let shutdown = tokio::time::sleep(Duration::from_millis(300));
        let stopped = tokio::time::timeout(Duration::from_secs(5), run(&pusher, shutdown)).await;
        assert!(stopped.is_ok(), "loop must stop while a push is in flight");
    }

    #[tokio::test]
    async fn test_push_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let payload = Snapshot::default().to_payload();
        assert!(pusher(server.uri(), None).push(&payload).await.is_err());
    }
}
