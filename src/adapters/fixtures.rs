//! Canned upstream responses shared by adapter and aggregator tests.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::volume::volume_url;
use crate::fetcher::mock::MockTransport;
use crate::fetcher::{FetchCache, Fetcher};
use crate::types::config::Endpoints;

pub(crate) const TZKT: &str = "https://tzkt.test";
pub(crate) const RPC: &str = "https://rpc.test";
pub(crate) const NOW_MS: u64 = 1_700_086_400_000;

pub(crate) fn endpoints() -> Endpoints {
    Endpoints {
        tzkt: TZKT.to_string(),
        rpc: RPC.to_string(),
    }
}

/// Single-attempt fetcher so failing stubs do not sleep through backoff.
pub(crate) fn fetcher(transport: Arc<MockTransport>) -> Fetcher {
    Fetcher::new(transport, Arc::new(FetchCache::new(Duration::from_secs(60))))
        .with_retry(1, Duration::ZERO)
}

pub(crate) fn stub_consensus(transport: &MockTransport) {
    transport
        .ok(&format!("{TZKT}/v1/delegates/count?active=true"), "350")
        .ok(
            &format!("{TZKT}/v1/delegates/count?active=true&consensusAddress.as=tz4*"),
            "40",
        )
        .ok(&format!("{TZKT}/v1/head"), r#"{"level": 9000, "cycle": 812}"#)
        .ok(
            &format!("{TZKT}/v1/cycles/812"),
            r#"{"index": 812, "firstLevel": 8001, "lastLevel": 10000}"#,
        );
}

pub(crate) fn stub_governance(transport: &MockTransport) {
    transport
        .ok(
            &format!("{TZKT}/v1/voting/periods/current"),
            r#"{
                "index": 130,
                "epoch": 70,
                "kind": "exploration",
                "totalVotingPower": 800000,
                "yayVotingPower": 400000,
                "nayVotingPower": 50000,
                "passVotingPower": 50000
            }"#,
        )
        .ok(
            &format!("{TZKT}/v1/voting/proposals?epoch=70&sort.desc=votingPower&limit=1"),
            r#"[{"hash": "PsRiotuma", "extras": {"alias": "Rio"}}]"#,
        );
}

pub(crate) fn stub_issuance(transport: &MockTransport) {
    transport
        .ok(
            &format!("{RPC}/chains/main/blocks/head/context/issuance/current_yearly_rate"),
            r#""4.53""#,
        )
        .ok(
            &format!("{RPC}/chains/main/blocks/head/context/total_supply"),
            r#""1000000000000000""#,
        );
}

pub(crate) fn stub_staking(transport: &MockTransport) {
    transport
        .ok(
            &format!("{RPC}/chains/main/blocks/head/context/total_frozen_stake"),
            r#""275000000000000""#,
        )
        .ok(
            &format!("{RPC}/chains/main/blocks/head/context/total_delegated_stake"),
            r#""450000000000000""#,
        );
}

pub(crate) fn stub_volume(transport: &MockTransport) {
    let url = volume_url(TZKT, NOW_MS, None).unwrap();
    transport.ok(
        &url,
        r#"[{"id": 1, "amount": 1500000}, {"id": 2, "amount": "2000000"}]"#,
    );
}

pub(crate) fn stub_ecosystem(transport: &MockTransport) {
    transport
        .ok(&format!("{TZKT}/v1/accounts/count?balance.gt=0"), "812345")
        .ok(&format!("{TZKT}/v1/contracts/count"), "45000")
        .ok(&format!("{TZKT}/v1/tokens/count"), "190000")
        .ok(&format!("{TZKT}/v1/smart_rollups/count"), "14");
}

pub(crate) fn stub_all(transport: &MockTransport) {
    stub_consensus(transport);
    stub_governance(transport);
    stub_issuance(transport);
    stub_staking(transport);
    stub_volume(transport);
    stub_ecosystem(transport);
}
