//! Source adapters. Each one reads a single concern from the upstream APIs
//! and returns a partial snapshot, or a failure the aggregator replaces with
//! the fragment's fallback.

pub mod consensus;
pub mod ecosystem;
pub mod governance;
pub mod issuance;
pub mod staking;
pub mod volume;

#[cfg(test)]
pub(crate) mod fixtures;

use serde_json::Value;
use tracing::warn;

use crate::fetcher::FetchError;
use crate::types::snapshot::Snapshot;

/// Outcome of one adapter run.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterResult<T> {
    Ok(T),
    Failed(String),
}

impl<T> AdapterResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, AdapterResult::Ok(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            AdapterResult::Ok(_) => None,
            AdapterResult::Failed(reason) => Some(reason),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            AdapterResult::Ok(value) => Some(value),
            AdapterResult::Failed(_) => None,
        }
    }
}

impl<T: Fragment> AdapterResult<T> {
    /// The fragment, or its documented fallback when the adapter failed.
    pub fn into_fragment(self) -> T {
        match self {
            AdapterResult::Ok(value) => value,
            AdapterResult::Failed(_) => T::fallback(),
        }
    }
}

/// A partial snapshot produced by one adapter.
///
/// `FIELDS` names the snapshot fields the fragment writes; no two fragments
/// may share a field.
pub trait Fragment: Sized + Send + 'static {
    const SOURCE: &'static str;
    const FIELDS: &'static [&'static str];

    fn fallback() -> Self;

    fn merge_into(self, snapshot: &mut Snapshot);
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected payload from {endpoint}: missing or invalid `{field}`")]
    Shape { endpoint: String, field: String },
    #[error("missing input: {0}")]
    MissingInput(&'static str),
}

/// Convert an adapter's internal result into its public outcome, logging
/// the failure.
pub(crate) fn settle<T>(source: &str, result: Result<T, AdapterError>) -> AdapterResult<T> {
    match result {
        Ok(value) => AdapterResult::Ok(value),
        Err(e) => {
            warn!(source, error = %e, "Source adapter failed, using fallback");
            AdapterResult::Failed(e.to_string())
        }
    }
}

/// Read a finite number at a JSON pointer. Numeric strings are accepted
/// because the node RPC encodes large integers as strings. An empty pointer
/// reads the payload itself.
pub(crate) fn number_at(payload: &Value, pointer: &str, endpoint: &str) -> Result<f64, AdapterError> {
    payload
        .pointer(pointer)
        .and_then(as_number)
        .ok_or_else(|| AdapterError::Shape {
            endpoint: endpoint.to_string(),
            field: if pointer.is_empty() {
                "<root>".to_string()
            } else {
                pointer.trim_start_matches('/').to_string()
            },
        })
}

/// Like [`number_at`] but for non-negative integer counts.
pub(crate) fn count_at(payload: &Value, pointer: &str, endpoint: &str) -> Result<u64, AdapterError> {
    let value = number_at(payload, pointer, endpoint)?;
    if value < 0.0 {
        return Err(AdapterError::Shape {
            endpoint: endpoint.to_string(),
            field: pointer.trim_start_matches('/').to_string(),
        });
    }
    Ok(value.round() as u64)
}

/// NaN and infinities are rejected; they serialize as `null` and would
/// poison the persisted snapshot.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

const MUTEZ_PER_TEZ: f64 = 1_000_000.0;

pub(crate) fn mutez_to_tez(mutez: f64) -> f64 {
    mutez / MUTEZ_PER_TEZ
}

/// `part / whole * 100`, or zero when `whole` is not positive.
pub(crate) fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Every fragment's source name and declared fields.
pub fn field_claims() -> Vec<(&'static str, &'static [&'static str])> {
    vec![
        (consensus::ConsensusStats::SOURCE, consensus::ConsensusStats::FIELDS),
        (governance::GovernanceStats::SOURCE, governance::GovernanceStats::FIELDS),
        (issuance::IssuanceStats::SOURCE, issuance::IssuanceStats::FIELDS),
        (staking::StakingStats::SOURCE, staking::StakingStats::FIELDS),
        (volume::VolumeStats::SOURCE, volume::VolumeStats::FIELDS),
        (ecosystem::EcosystemStats::SOURCE, ecosystem::EcosystemStats::FIELDS),
    ]
}
