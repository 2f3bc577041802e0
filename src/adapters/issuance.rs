use crate::adapters::{mutez_to_tez, number_at, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceStats {
    /// Yearly issuance rate, in percent.
    pub current_issuance_rate: f64,
    /// Total supply in tez.
    pub total_supply: f64,
}

/// Total supply measured by the issuance adapter, handed to adapters that
/// need the same point-in-time figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyInput {
    pub total_supply_tez: f64,
}

impl IssuanceStats {
    pub fn supply(&self) -> SupplyInput {
        SupplyInput {
            total_supply_tez: self.total_supply,
        }
    }
}

impl Fragment for IssuanceStats {
    const SOURCE: &'static str = "issuance";
    const FIELDS: &'static [&'static str] = &["currentIssuanceRate", "totalSupply"];

    fn fallback() -> Self {
        Self {
            current_issuance_rate: 0.0,
            total_supply: 0.0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.current_issuance_rate = self.current_issuance_rate;
        snapshot.total_supply = self.total_supply;
    }
}

pub async fn fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> AdapterResult<IssuanceStats> {
    settle(IssuanceStats::SOURCE, try_fetch(fetcher, endpoints).await)
}

async fn try_fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> Result<IssuanceStats, AdapterError> {
    let rate_url = format!(
        "{}/chains/main/blocks/head/context/issuance/current_yearly_rate",
        endpoints.rpc
    );
    let supply_url = format!("{}/chains/main/blocks/head/context/total_supply", endpoints.rpc);

    let rate_req = FetchRequest::get(rate_url.as_str());
    let supply_req = FetchRequest::get(supply_url.as_str());
    let (rate, supply) = tokio::try_join!(fetcher.fetch(&rate_req), fetcher.fetch(&supply_req))?;

    Ok(IssuanceStats {
        current_issuance_rate: number_at(&rate, "", &rate_url)?,
        total_supply: mutez_to_tez(number_at(&supply, "", &supply_url)?),
    })
}
