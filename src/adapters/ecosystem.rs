use crate::adapters::{count_at, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

/// Ecosystem size counters from the indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct EcosystemStats {
    pub funded_accounts: u64,
    pub smart_contracts: u64,
    pub tokens: u64,
    pub rollups: u64,
}

impl Fragment for EcosystemStats {
    const SOURCE: &'static str = "ecosystem";
    const FIELDS: &'static [&'static str] = &["fundedAccounts", "smartContracts", "tokens", "rollups"];

    fn fallback() -> Self {
        Self {
            funded_accounts: 0,
            smart_contracts: 0,
            tokens: 0,
            rollups: 0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.funded_accounts = self.funded_accounts;
        snapshot.smart_contracts = self.smart_contracts;
        snapshot.tokens = self.tokens;
        snapshot.rollups = self.rollups;
    }
}

pub async fn fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> AdapterResult<EcosystemStats> {
    settle(EcosystemStats::SOURCE, try_fetch(fetcher, endpoints).await)
}

async fn try_fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> Result<EcosystemStats, AdapterError> {
    let urls = [
        format!("{}/v1/accounts/count?balance.gt=0", endpoints.tzkt),
        format!("{}/v1/contracts/count", endpoints.tzkt),
        format!("{}/v1/tokens/count", endpoints.tzkt),
        format!("{}/v1/smart_rollups/count", endpoints.tzkt),
    ];
    let requests = urls.clone().map(FetchRequest::get);

    let (accounts, contracts, tokens, rollups) = tokio::try_join!(
        fetcher.fetch(&requests[0]),
        fetcher.fetch(&requests[1]),
        fetcher.fetch(&requests[2]),
        fetcher.fetch(&requests[3]),
    )?;

    Ok(EcosystemStats {
        funded_accounts: count_at(&accounts, "", &urls[0])?,
        smart_contracts: count_at(&contracts, "", &urls[1])?,
        tokens: count_at(&tokens, "", &urls[2])?,
        rollups: count_at(&rollups, "", &urls[3])?,
    })
}
