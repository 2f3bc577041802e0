use serde::{Deserialize, Serialize};

use crate::types::metric::MetricFormat;

/// Placeholder shown for text metrics whose source could not be reached.
pub const NOT_AVAILABLE: &str = "N/A";

/// One merged reading of every tracked network metric.
///
/// Every field always carries a value. Sources that fail contribute their
/// documented fallback instead of leaving a hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub total_bakers: u64,
    pub tz4_percentage: f64,
    pub cycle: u64,
    pub cycle_progress: f64,
    pub current_issuance_rate: f64,
    pub staking_ratio: f64,
    pub delegated_ratio: f64,
    pub total_supply: f64,
    pub transaction_volume_24h: f64,
    pub proposal: String,
    pub voting_period: String,
    pub participation: f64,
    pub funded_accounts: u64,
    pub smart_contracts: u64,
    pub tokens: u64,
    pub rollups: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            total_bakers: 0,
            tz4_percentage: 0.0,
            cycle: 0,
            cycle_progress: 0.0,
            current_issuance_rate: 0.0,
            staking_ratio: 0.0,
            delegated_ratio: 0.0,
            total_supply: 0.0,
            transaction_volume_24h: 0.0,
            proposal: NOT_AVAILABLE.to_string(),
            voting_period: NOT_AVAILABLE.to_string(),
            participation: 0.0,
            funded_accounts: 0,
            smart_contracts: 0,
            tokens: 0,
            rollups: 0,
        }
    }
}

impl Snapshot {
    /// Serialized field names, in display order.
    pub const FIELDS: &'static [&'static str] = &[
        "totalBakers",
        "tz4Percentage",
        "cycle",
        "cycleProgress",
        "currentIssuanceRate",
        "stakingRatio",
        "delegatedRatio",
        "totalSupply",
        "transactionVolume24h",
        "proposal",
        "votingPeriod",
        "participation",
        "fundedAccounts",
        "smartContracts",
        "tokens",
        "rollups",
    ];

    /// Numeric value of a field by its serialized name. Text fields and
    /// unknown names yield `None`.
    pub fn numeric(&self, key: &str) -> Option<f64> {
        let value = match key {
            "totalBakers" => self.total_bakers as f64,
            "tz4Percentage" => self.tz4_percentage,
            "cycle" => self.cycle as f64,
            "cycleProgress" => self.cycle_progress,
            "currentIssuanceRate" => self.current_issuance_rate,
            "stakingRatio" => self.staking_ratio,
            "delegatedRatio" => self.delegated_ratio,
            "totalSupply" => self.total_supply,
            "transactionVolume24h" => self.transaction_volume_24h,
            "participation" => self.participation,
            "fundedAccounts" => self.funded_accounts as f64,
            "smartContracts" => self.smart_contracts as f64,
            "tokens" => self.tokens as f64,
            "rollups" => self.rollups as f64,
            _ => return None,
        };
        Some(value)
    }

    fn text(&self, key: &str) -> Option<&str> {
        match key {
            "proposal" => Some(&self.proposal),
            "votingPeriod" => Some(&self.voting_period),
            _ => None,
        }
    }

    /// Display format of a numeric field.
    pub fn format_of(key: &str) -> Option<MetricFormat> {
        let format = match key {
            "totalBakers" | "cycle" | "fundedAccounts" | "smartContracts" | "tokens"
            | "rollups" => MetricFormat::Count,
            "tz4Percentage" | "cycleProgress" | "currentIssuanceRate" | "stakingRatio"
            | "delegatedRatio" | "participation" => MetricFormat::Percent,
            "totalSupply" | "transactionVolume24h" => MetricFormat::Supply,
            _ => return None,
        };
        Some(format)
    }

    /// Field rendered the way the presentation layer shows it.
    pub fn rendered(&self, key: &str) -> Option<String> {
        if let Some(text) = self.text(key) {
            return Some(text.to_string());
        }
        let value = self.numeric(key)?;
        Self::format_of(key).map(|format| format.render(value))
    }

    /// Fields whose rendered value differs between `self` and `next`, in
    /// display order.
    pub fn changed_fields(&self, next: &Snapshot) -> Vec<&'static str> {
        Self::FIELDS
            .iter()
            .copied()
            .filter(|key| self.rendered(key) != next.rendered(key))
            .collect()
    }
}
