use crate::adapters::issuance::SupplyInput;
use crate::adapters::{mutez_to_tez, number_at, percentage, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

/// Staked and delegated shares of the total supply, in percent.
///
/// Both ratios come from the node's frozen and delegated stake totals divided
/// by the supply measured in the same aggregation run. Without a supply
/// figure the adapter fails and both ratios fall back to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StakingStats {
    pub staking_ratio: f64,
    pub delegated_ratio: f64,
}

impl Fragment for StakingStats {
    const SOURCE: &'static str = "staking";
    const FIELDS: &'static [&'static str] = &["stakingRatio", "delegatedRatio"];

    fn fallback() -> Self {
        Self {
            staking_ratio: 0.0,
            delegated_ratio: 0.0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.staking_ratio = self.staking_ratio;
        snapshot.delegated_ratio = self.delegated_ratio;
    }
}

pub async fn fetch(
    fetcher: &Fetcher,
    endpoints: &Endpoints,
    supply: Option<SupplyInput>,
) -> AdapterResult<StakingStats> {
    settle(StakingStats::SOURCE, try_fetch(fetcher, endpoints, supply).await)
}

async fn try_fetch(
    fetcher: &Fetcher,
    endpoints: &Endpoints,
    supply: Option<SupplyInput>,
) -> Result<StakingStats, AdapterError> {
    let supply = supply
        .map(|s| s.total_supply_tez)
        .filter(|tez| *tez > 0.0)
        .ok_or(AdapterError::MissingInput("total supply"))?;

    let frozen_url = format!(
        "{}/chains/main/blocks/head/context/total_frozen_stake",
        endpoints.rpc
    );
    let delegated_url = format!(
        "{}/chains/main/blocks/head/context/total_delegated_stake",
        endpoints.rpc
    );

    let frozen_req = FetchRequest::get(frozen_url.as_str());
    let delegated_req = FetchRequest::get(delegated_url.as_str());
    let (frozen, delegated) =
        tokio::try_join!(fetcher.fetch(&frozen_req), fetcher.fetch(&delegated_req))?;

    let frozen = mutez_to_tez(number_at(&frozen, "", &frozen_url)?);
    let delegated = mutez_to_tez(number_at(&delegated, "", &delegated_url)?);

    Ok(StakingStats {
        staking_ratio: percentage(frozen, supply),
        delegated_ratio: percentage(delegated, supply),
    })
}
