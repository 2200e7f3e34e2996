//! Agent configuration, read from the environment (and `.env`).
//!
//! - `HOMEDASH_URL`: kernel base URL (default `http://localhost:8080`)
//! - `HOMEDASH_NODE_ID`: node id sent as `x-node-id` (default: hostname)
//! - `HOMEDASH_INGESTION_KEY`: optional `x-ingestion-key`
//! - `HOMEDASH_INTERVAL_SECS`: push period (default 10)

use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub server_url: String,
    pub node_id: String,
    pub ingestion_key: Option<String>,
    pub interval: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_url = non_empty("HOMEDASH_URL")
            .unwrap_or_else(|| DEFAULT_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let node_id = match non_empty("HOMEDASH_NODE_ID") {
            Some(id) => id,
            None => hostname::get()
                .context("reading hostname")?
                .to_string_lossy()
                .into_owned(),
        };

        let interval_secs = match non_empty("HOMEDASH_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("HOMEDASH_INTERVAL_SECS '{raw}' is not a number"))?,
            None => DEFAULT_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            bail!("HOMEDASH_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            server_url,
            node_id,
            ingestion_key: non_empty("HOMEDASH_INGESTION_KEY"),
            interval: Duration::from_secs(interval_secs),
        })
    }

    pub fn ingest_url(&self) -> String {
        format!("{}/api/telegraf/ingest", self.server_url)
    }
}
