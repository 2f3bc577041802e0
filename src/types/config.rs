use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the pipeline. Missing keys take their defaults, so a
/// partial JSON document is always a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub tzkt_url: String,
    pub rpc_url: String,
    pub fetch_ttl_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub snapshot_ttl_secs: u64,
    pub visit_min_gap_secs: u64,
    pub animation_ms: u64,
    pub poll_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tzkt_url: "https://api.tzkt.io".to_string(),
            rpc_url: "https://rpc.tzkt.io/mainnet".to_string(),
            fetch_ttl_secs: 60,
            max_attempts: 3,
            retry_backoff_ms: 1_000,
            request_timeout_secs: 10,
            snapshot_ttl_secs: 4 * 60 * 60,
            visit_min_gap_secs: 60 * 60,
            animation_ms: 600,
            poll_interval_secs: 60,
        }
    }
}

impl PipelineConfig {
    pub fn fetch_ttl(&self) -> Duration {
        Duration::from_secs(self.fetch_ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn visit_min_gap(&self) -> Duration {
        Duration::from_secs(self.visit_min_gap_secs)
    }

    pub fn animation(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }

    /// Poll interval, never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Endpoints handed to the source adapters.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            tzkt: self.tzkt_url.trim_end_matches('/').to_string(),
            rpc: self.rpc_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Base URLs of the upstream services, without trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub tzkt: String,
    pub rpc: String,
}
