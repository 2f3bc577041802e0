use serde_json::Value;

use crate::adapters::{as_number, count_at, percentage, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::{Snapshot, NOT_AVAILABLE};

/// Current on-chain governance state.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernanceStats {
    pub proposal: String,
    pub voting_period: String,
    pub participation: f64,
}

impl Fragment for GovernanceStats {
    const SOURCE: &'static str = "governance";
    const FIELDS: &'static [&'static str] = &["proposal", "votingPeriod", "participation"];

    fn fallback() -> Self {
        Self {
            proposal: NOT_AVAILABLE.to_string(),
            voting_period: NOT_AVAILABLE.to_string(),
            participation: 0.0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.proposal = self.proposal;
        snapshot.voting_period = self.voting_period;
        snapshot.participation = self.participation;
    }
}

pub async fn fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> AdapterResult<GovernanceStats> {
    settle(GovernanceStats::SOURCE, try_fetch(fetcher, endpoints).await)
}

async fn try_fetch(fetcher: &Fetcher, endpoints: &Endpoints) -> Result<GovernanceStats, AdapterError> {
    let period_url = format!("{}/v1/voting/periods/current", endpoints.tzkt);
    let period = fetcher.fetch(&FetchRequest::get(period_url.as_str())).await?;

    let kind = period
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::Shape {
            endpoint: period_url.clone(),
            field: "kind".to_string(),
        })?;
    let epoch = count_at(&period, "/epoch", &period_url)?;

    let proposals_url = format!(
        "{}/v1/voting/proposals?epoch={}&sort.desc=votingPower&limit=1",
        endpoints.tzkt, epoch
    );
    let proposals = fetcher.fetch(&FetchRequest::get(proposals_url.as_str())).await?;

    Ok(GovernanceStats {
        proposal: leading_proposal(&proposals),
        voting_period: kind.to_string(),
        participation: participation(&period),
    })
}

/// Alias of the top proposal, falling back to its hash. An epoch without
/// proposals is reported as not available rather than as a failure.
fn leading_proposal(proposals: &Value) -> String {
    proposals
        .as_array()
        .and_then(|list| list.first())
        .and_then(|top| {
            top.pointer("/extras/alias")
                .and_then(Value::as_str)
                .or_else(|| top.get("hash").and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Share of voting power that has cast a ballot. Periods without ballots
/// (proposal, cooldown, adoption) report zero.
fn participation(period: &Value) -> f64 {
    let power = |key: &str| period.get(key).and_then(as_number).unwrap_or(0.0);
    let cast = power("yayVotingPower") + power("nayVotingPower") + power("passVotingPower");
    percentage(cast, power("totalVotingPower"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fixtures::{endpoints, fetcher, stub_governance};
    use crate::fetcher::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn reads_period_and_top_proposal() {
        let transport = Arc::new(MockTransport::new());
        stub_governance(&transport);

        let stats = fetch(&fetcher(transport), &endpoints()).await.ok().unwrap();
        assert_eq!(stats.voting_period, "exploration");
        assert_eq!(stats.proposal, "Rio");
        assert!((stats.participation - 62.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unreachable_period_falls_back() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("https://tzkt.test/v1/voting/periods/current");

        let result = fetch(&fetcher(transport), &endpoints()).await;
        assert!(!result.is_ok());
        assert_eq!(result.into_fragment(), GovernanceStats::fallback());
    }

    #[test]
    fn proposal_falls_back_to_hash_then_na() {
        assert_eq!(leading_proposal(&json!([{"hash": "PtXyz"}])), "PtXyz");
        assert_eq!(leading_proposal(&json!([])), NOT_AVAILABLE);
        assert_eq!(leading_proposal(&json!({"error": "x"})), NOT_AVAILABLE);
    }

    #[test]
    fn participation_without_ballots_is_zero() {
        assert_eq!(participation(&json!({"kind": "proposal"})), 0.0);
    }
}
