use crate::adapters::{count_at, percentage, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

/// Active baker population and position within the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusStats {
    pub total_bakers: u64,
    pub tz4_percentage: f64,
    pub cycle: u64,
    pub cycle_progress: f64,
}

impl ConsensusStats {
    /// Share of bakers using a tz4 (BLS) consensus key.
    pub fn from_counts(total: u64, tz4_count: u64, cycle: u64, cycle_progress: f64) -> Self {
        Self {
            total_bakers: total,
            tz4_percentage: percentage(tz4_count as f64, total as f64),
            cycle,
            cycle_progress,
        }
    }
}

impl Fragment for ConsensusStats {
    const SOURCE: &'static str = "consensus";
    const FIELDS: &'static [&'static str] =
        &["totalBakers", "tz4Percentage", "cycle", "cycleProgress"];

    fn fallback() -> Self {
        Self {
            total_bakers: 0,
            tz4_percentage: 0.0,
            cycle: 0,
            cycle_progress: 0.0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.total_bakers = self.total_bakers;
        snapshot.tz4_percentage = self.tz4_percentage;
        snapshot.cycle = self.cycle;
        snapshot.cycle_progress = self.cycle_progress;
    }
}

pub async fn fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> AdapterResult<ConsensusStats> {
    settle(ConsensusStats::SOURCE, try_fetch(fetcher, endpoints).await)
}

async fn try_fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> Result<ConsensusStats, AdapterError> {
    let total_url = format!("{}/v1/delegates/count?active=true", endpoints.tzkt);
    let tz4_url = format!(
        "{}/v1/delegates/count?active=true&consensusAddress.as=tz4*",
        endpoints.tzkt
    );
    let head_url = format!("{}/v1/head", endpoints.tzkt);

    let total_req = FetchRequest::get(total_url.as_str());
    let tz4_req = FetchRequest::get(tz4_url.as_str());
    let head_req = FetchRequest::get(head_url.as_str());
    let (total, tz4, head) = tokio::try_join!(
        fetcher.fetch(&total_req),
        fetcher.fetch(&tz4_req),
        fetcher.fetch(&head_req),
    )?;

    let total = count_at(&total, "", &total_url)?;
    let tz4_count = count_at(&tz4, "", &tz4_url)?;
    let level = count_at(&head, "/level", &head_url)?;
    let cycle = count_at(&head, "/cycle", &head_url)?;

    let cycle_url = format!("{}/v1/cycles/{}", endpoints.tzkt, cycle);
    let cycle_info = fetcher.fetch(&FetchRequest::get(cycle_url.as_str())).await?;
    let first_level = count_at(&cycle_info, "/firstLevel", &cycle_url)?;
    let last_level = count_at(&cycle_info, "/lastLevel", &cycle_url)?;

    Ok(ConsensusStats::from_counts(
        total,
        tz4_count,
        cycle,
        cycle_progress(level, first_level, last_level),
    ))
}

/// Percentage of the cycle's blocks already produced, clamped to 0..=100.
fn cycle_progress(level: u64, first_level: u64, last_level: u64) -> f64 {
    if last_level < first_level {
        return 0.0;
    }
    let length = (last_level - first_level + 1) as f64;
    let done = level.saturating_sub(first_level) as f64;
    (done / length * 100.0).clamp(0.0, 100.0)
}
