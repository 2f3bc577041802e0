use serde::{Deserialize, Serialize};

/// Consecutive failures after which a source is reported offline.
const OFFLINE_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHealthStatus {
    Healthy,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source_id: String,
    pub status: SourceHealthStatus,
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
    pub fail_count: u32,
    pub latency_ms: u64,
    pub message: Option<String>,
}

impl SourceHealth {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SourceHealthStatus::Healthy,
            last_success: None,
            last_failure: None,
            fail_count: 0,
            latency_ms: 0,
            message: None,
        }
    }

    pub fn record_success(&mut self, now_ms: u64, latency_ms: u64) {
        self.status = SourceHealthStatus::Healthy;
        self.last_success = Some(now_ms);
        self.fail_count = 0;
        self.latency_ms = latency_ms;
        self.message = None;
    }

    pub fn record_failure(&mut self, now_ms: u64, latency_ms: u64, reason: &str) {
        self.fail_count = self.fail_count.saturating_add(1);
        self.status = if self.fail_count >= OFFLINE_AFTER {
            SourceHealthStatus::Offline
        } else {
            SourceHealthStatus::Degraded
        };
        self.last_failure = Some(now_ms);
        self.latency_ms = latency_ms;
        self.message = Some(reason.to_string());
    }
}
