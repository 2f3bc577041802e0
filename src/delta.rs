//! "Since your last visit" comparison between the current snapshot and the
//! stored visit marker.

use std::time::Duration;

use crate::store::VisitMarker;
use crate::types::metric::{DeltaMetric, Direction, MetricFormat};
use crate::types::snapshot::Snapshot;

pub struct TrackedMetric {
    pub key: &'static str,
    pub label: &'static str,
    pub format: MetricFormat,
}

/// Metrics compared between visits, in display order.
pub const TRACKED_METRICS: &[TrackedMetric] = &[
    TrackedMetric { key: "totalBakers", label: "Total bakers", format: MetricFormat::Count },
    TrackedMetric { key: "tz4Percentage", label: "tz4 bakers", format: MetricFormat::Percent },
    TrackedMetric { key: "stakingRatio", label: "Staking ratio", format: MetricFormat::Percent },
    TrackedMetric { key: "currentIssuanceRate", label: "Issuance rate", format: MetricFormat::Percent },
    TrackedMetric { key: "totalSupply", label: "Total supply", format: MetricFormat::Supply },
    TrackedMetric { key: "transactionVolume24h", label: "24h volume", format: MetricFormat::Supply },
    TrackedMetric { key: "fundedAccounts", label: "Funded accounts", format: MetricFormat::Count },
    TrackedMetric { key: "smartContracts", label: "Smart contracts", format: MetricFormat::Count },
    TrackedMetric { key: "tokens", label: "Tokens", format: MetricFormat::Count },
    TrackedMetric { key: "rollups", label: "Smart rollups", format: MetricFormat::Count },
];

/// Changes since the marker's snapshot.
///
/// Returns `None` when there is no marker or it is younger than `min_gap`.
/// Unchanged metrics are left out, so `Some(vec![])` is possible.
pub fn compute_deltas(
    current: &Snapshot,
    marker: Option<&VisitMarker>,
    now_ms: u64,
    min_gap: Duration,
) -> Option<Vec<DeltaMetric>> {
    let marker = marker?;
    if now_ms.saturating_sub(marker.visit_at) < min_gap.as_millis() as u64 {
        return None;
    }

    let deltas = TRACKED_METRICS
        .iter()
        .filter_map(|metric| {
            let previous = marker.snapshot.numeric(metric.key)?;
            let current = current.numeric(metric.key)?;
            if previous == current {
                return None;
            }
            let delta = current - previous;
            Some(DeltaMetric {
                key: metric.key.to_string(),
                label: metric.label.to_string(),
                previous,
                current,
                delta,
                percent_change: if previous != 0.0 { delta / previous * 100.0 } else { 0.0 },
                direction: if delta > 0.0 { Direction::Up } else { Direction::Down },
                format: metric.format,
            })
        })
        .collect();
    Some(deltas)
}
