use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::adapters::{
    consensus, ecosystem, field_claims, governance, issuance, staking, volume, AdapterResult,
    Fragment,
};
use crate::clock::Clock;
use crate::fetcher::Fetcher;
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("snapshot field `{field}` is claimed by both `{first}` and `{second}`")]
    FieldConflict {
        field: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("snapshot field `{0}` has no source")]
    UncoveredField(&'static str),
    #[error("source adapter `{0}` panicked")]
    AdapterPanicked(&'static str),
    #[error("source adapter `{0}` was cancelled")]
    AdapterCancelled(&'static str),
}

/// How one adapter fared in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    pub source: &'static str,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub snapshot: Snapshot,
    pub sources: Vec<SourceOutcome>,
    pub finished_at: u64,
}

impl Aggregation {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.sources.iter().filter(|s| s.error.is_some())
    }
}

/// Check that every snapshot field is written by exactly one adapter.
pub fn verify_field_ownership(
    claims: &[(&'static str, &'static [&'static str])],
) -> Result<(), AggregateError> {
    let mut owners: Vec<(&'static str, &'static str)> = Vec::new();
    for (source, fields) in claims {
        for field in fields.iter() {
            if let Some((_, first)) = owners.iter().find(|(f, _)| f == field) {
                return Err(AggregateError::FieldConflict {
                    field: *field,
                    first: *first,
                    second: *source,
                });
            }
            owners.push((*field, *source));
        }
    }
    for field in Snapshot::FIELDS {
        if !owners.iter().any(|(f, _)| f == field) {
            return Err(AggregateError::UncoveredField(*field));
        }
    }
    Ok(())
}

/// Runs every source adapter and merges their fragments into a snapshot.
pub struct Aggregator {
    fetcher: Fetcher,
    endpoints: Endpoints,
    clock: Arc<dyn Clock>,
}

type Timed<T> = (AdapterResult<T>, u64);

impl Aggregator {
    pub fn new(fetcher: Fetcher, endpoints: Endpoints, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            endpoints,
            clock,
        }
    }

    /// Query all sources and merge what they return.
    ///
    /// Issuance runs first because staking needs its supply figure; the other
    /// five adapters then run concurrently and are all awaited, whatever their
    /// outcome. Adapter failures are replaced by fallbacks. Only a panic inside
    /// an adapter, or a field ownership violation, fails the run.
    pub async fn aggregate(&self) -> Result<Aggregation, AggregateError> {
        verify_field_ownership(&field_claims())?;
        let started = Instant::now();
        let now_ms = self.clock.now_ms();

        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let issuance_done = settle_task(
            issuance::IssuanceStats::SOURCE,
            spawn_timed(async move { issuance::fetch(&fetcher, &endpoints).await }),
        )
        .await?;
        let supply = issuance_done.0.clone().ok().map(|stats| stats.supply());

        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let consensus_task =
            spawn_timed(async move { consensus::fetch(&fetcher, &endpoints).await });
        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let governance_task =
            spawn_timed(async move { governance::fetch(&fetcher, &endpoints).await });
        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let staking_task =
            spawn_timed(async move { staking::fetch(&fetcher, &endpoints, supply).await });
        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let volume_task =
            spawn_timed(async move { volume::fetch(&fetcher, &endpoints, now_ms).await });
        let (fetcher, endpoints) = (self.fetcher.clone(), self.endpoints.clone());
        let ecosystem_task =
            spawn_timed(async move { ecosystem::fetch(&fetcher, &endpoints).await });

        let (consensus_done, governance_done, staking_done, volume_done, ecosystem_done) = tokio::join!(
            consensus_task,
            governance_task,
            staking_task,
            volume_task,
            ecosystem_task,
        );

        let mut snapshot = Snapshot::default();
        let mut sources = Vec::with_capacity(6);
        merge(&mut snapshot, &mut sources, issuance_done);
        merge(&mut snapshot, &mut sources, joined(consensus::ConsensusStats::SOURCE, consensus_done)?);
        merge(&mut snapshot, &mut sources, joined(governance::GovernanceStats::SOURCE, governance_done)?);
        merge(&mut snapshot, &mut sources, joined(staking::StakingStats::SOURCE, staking_done)?);
        merge(&mut snapshot, &mut sources, joined(volume::VolumeStats::SOURCE, volume_done)?);
        merge(&mut snapshot, &mut sources, joined(ecosystem::EcosystemStats::SOURCE, ecosystem_done)?);

        let failed = sources.iter().filter(|s| s.error.is_some()).count();
        info!(
            sources = sources.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Aggregation complete"
        );

        Ok(Aggregation {
            snapshot,
            sources,
            finished_at: self.clock.now_ms(),
        })
    }
}

fn spawn_timed<T, F>(adapter: F) -> JoinHandle<Timed<T>>
where
    T: Send + 'static,
    F: Future<Output = AdapterResult<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let started = Instant::now();
        let result = adapter.await;
        (result, started.elapsed().as_millis() as u64)
    })
}

async fn settle_task<T>(
    source: &'static str,
    handle: JoinHandle<Timed<T>>,
) -> Result<Timed<T>, AggregateError> {
    joined(source, handle.await)
}

fn joined<T>(
    source: &'static str,
    result: Result<Timed<T>, JoinError>,
) -> Result<Timed<T>, AggregateError> {
    result.map_err(|e| {
        if e.is_panic() {
            AggregateError::AdapterPanicked(source)
        } else {
            AggregateError::AdapterCancelled(source)
        }
    })
}

fn merge<T: Fragment>(snapshot: &mut Snapshot, sources: &mut Vec<SourceOutcome>, timed: Timed<T>) {
    let (result, latency_ms) = timed;
    debug!(source = T::SOURCE, latency_ms, ok = result.is_ok(), "Merging fragment");
    sources.push(SourceOutcome {
        source: T::SOURCE,
        latency_ms,
        error: result.failure().map(str::to_string),
    });
    result.into_fragment().merge_into(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixtures::{self, endpoints, stub_all, NOW_MS, RPC, TZKT};
    use crate::clock::ManualClock;
    use crate::fetcher::mock::MockTransport;
    use crate::types::snapshot::NOT_AVAILABLE;

    fn aggregator(transport: &Arc<MockTransport>) -> Aggregator {
        Aggregator::new(
            fixtures::fetcher(transport.clone()),
            endpoints(),
            Arc::new(ManualClock::new(NOW_MS)),
        )
    }

    #[tokio::test]
    async fn merges_every_source() {
        let transport = Arc::new(MockTransport::new());
        stub_all(&transport);

        let run = aggregator(&transport).aggregate().await.unwrap();
        let snapshot = &run.snapshot;
        assert_eq!(snapshot.total_bakers, 350);
        assert!((snapshot.tz4_percentage - 11.43).abs() < 0.005);
        assert_eq!(snapshot.cycle, 812);
        assert_eq!(snapshot.current_issuance_rate, 4.53);
        assert_eq!(snapshot.total_supply, 1_000_000_000.0);
        assert!((snapshot.staking_ratio - 27.5).abs() < 1e-9);
        assert_eq!(snapshot.transaction_volume_24h, 3.5);
        assert_eq!(snapshot.proposal, "Rio");
        assert_eq!(snapshot.rollups, 14);
        assert_eq!(run.sources.len(), 6);
        assert_eq!(run.failed_sources().count(), 0);
        assert_eq!(run.finished_at, NOW_MS);
    }

    #[tokio::test]
    async fn partial_failure_keeps_other_sources() {
        let transport = Arc::new(MockTransport::new());
        fixtures::stub_consensus(&transport);
        fixtures::stub_issuance(&transport);
        fixtures::stub_staking(&transport);
        fixtures::stub_ecosystem(&transport);
        transport.fail(&format!("{TZKT}/v1/voting/periods/current"));

        let run = aggregator(&transport).aggregate().await.unwrap();
        let snapshot = &run.snapshot;
        assert_eq!(snapshot.total_bakers, 350);
        assert_eq!(snapshot.funded_accounts, 812_345);
        assert_eq!(snapshot.proposal, NOT_AVAILABLE);
        assert_eq!(snapshot.voting_period, NOT_AVAILABLE);
        assert_eq!(snapshot.participation, 0.0);
        assert_eq!(snapshot.transaction_volume_24h, 0.0);

        let failed: Vec<&str> = run.failed_sources().map(|s| s.source).collect();
        assert_eq!(failed, vec!["governance", "volume"]);
    }

    #[tokio::test]
    async fn staking_falls_back_when_issuance_fails() {
        let transport = Arc::new(MockTransport::new());
        fixtures::stub_consensus(&transport);
        fixtures::stub_governance(&transport);
        fixtures::stub_staking(&transport);
        fixtures::stub_volume(&transport);
        fixtures::stub_ecosystem(&transport);
        transport
            .ok(
                &format!("{RPC}/chains/main/blocks/head/context/issuance/current_yearly_rate"),
                "4.53",
            )
            .fail(&format!("{RPC}/chains/main/blocks/head/context/total_supply"));

        let run = aggregator(&transport).aggregate().await.unwrap();
        assert_eq!(run.snapshot.total_supply, 0.0);
        assert_eq!(run.snapshot.staking_ratio, 0.0);
        assert_eq!(run.snapshot.delegated_ratio, 0.0);
        assert_eq!(
            transport.calls_to(&format!(
                "{RPC}/chains/main/blocks/head/context/total_frozen_stake"
            )),
            0
        );
        assert_eq!(run.snapshot.total_bakers, 350);
    }

    #[tokio::test]
    async fn adapter_panic_fails_the_run() {
        let transport = Arc::new(MockTransport::new());
        fixtures::stub_consensus(&transport);
        fixtures::stub_governance(&transport);
        fixtures::stub_issuance(&transport);
        fixtures::stub_staking(&transport);
        fixtures::stub_volume(&transport);
        transport
            .panic_on(&format!("{TZKT}/v1/accounts/count?balance.gt=0"))
            .panic_on(&format!("{TZKT}/v1/contracts/count"))
            .panic_on(&format!("{TZKT}/v1/tokens/count"))
            .panic_on(&format!("{TZKT}/v1/smart_rollups/count"));

        let err = aggregator(&transport).aggregate().await.unwrap_err();
        assert!(matches!(err, AggregateError::AdapterPanicked("ecosystem")));
    }

    #[test]
    fn shipped_adapters_own_disjoint_fields() {
        verify_field_ownership(&field_claims()).unwrap();
    }

    #[test]
    fn overlapping_claims_are_rejected() {
        const A: &[&str] = &["totalBakers", "cycle"];
        const B: &[&str] = &["cycle"];
        let err = verify_field_ownership(&[("a", A), ("b", B)]).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::FieldConflict {
                field: "cycle",
                first: "a",
                second: "b"
            }
        ));
    }

    #[test]
    fn uncovered_field_is_rejected() {
        let mut claims = field_claims();
        claims.retain(|(source, _)| *source != "volume");
        let err = verify_field_ownership(&claims).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::UncoveredField("transactionVolume24h")
        ));
    }
}
