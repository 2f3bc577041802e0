use chrono::{DateTime, SecondsFormat};

use crate::adapters::{count_at, mutez_to_tez, number_at, settle, AdapterError, AdapterResult, Fragment};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::config::Endpoints;
use crate::types::snapshot::Snapshot;

const WINDOW_MS: u64 = 24 * 60 * 60 * 1_000;
const PAGE_LIMIT: usize = 10_000;

/// Tez moved by applied transactions over the last 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeStats {
    pub transaction_volume_24h: f64,
}

impl Fragment for VolumeStats {
    const SOURCE: &'static str = "volume";
    const FIELDS: &'static [&'static str] = &["transactionVolume24h"];

    fn fallback() -> Self {
        Self {
            transaction_volume_24h: 0.0,
        }
    }

    fn merge_into(self, snapshot: &mut Snapshot) {
        snapshot.transaction_volume_24h = self.transaction_volume_24h;
    }
}

/// `now_ms` anchors the 24 hour window.
pub async fn fetch(fetcher: &Fetcher, endpoints: &Endpoints, now_ms: u64) -> AdapterResult<VolumeStats> {
    settle(VolumeStats::SOURCE, try_fetch(fetcher, endpoints, now_ms).await)
}

/// Walks the window in id order with a cursor until a short page comes back.
async fn try_fetch(
    fetcher: &Fetcher,
    endpoints: &Endpoints,
    now_ms: u64,
) -> Result<VolumeStats, AdapterError> {
    let mut mutez = 0.0;
    let mut cursor = None;
    loop {
        let url = volume_url(&endpoints.tzkt, now_ms, cursor)?;
        let page = fetcher.fetch(&FetchRequest::get(url.as_str())).await?;
        let rows = page.as_array().ok_or_else(|| AdapterError::Shape {
            endpoint: url.clone(),
            field: "<root>".to_string(),
        })?;

        let mut last_id = None;
        for row in rows {
            mutez += number_at(row, "/amount", &url)?;
            last_id = Some(count_at(row, "/id", &url)?);
        }

        if rows.len() < PAGE_LIMIT {
            break;
        }
        match (last_id, cursor) {
            (Some(id), Some(previous)) if id <= previous => {
                return Err(AdapterError::Shape {
                    endpoint: url,
                    field: "id".to_string(),
                })
            }
            (next, _) => cursor = next,
        }
    }

    Ok(VolumeStats {
        transaction_volume_24h: mutez_to_tez(mutez),
    })
}

/// One page of the window, starting after operation id `cursor`.
pub(crate) fn volume_url(tzkt: &str, now_ms: u64, cursor: Option<u64>) -> Result<String, AdapterError> {
    let since_ms = now_ms.saturating_sub(WINDOW_MS);
    let since = DateTime::from_timestamp_millis(since_ms as i64)
        .ok_or(AdapterError::MissingInput("valid window start"))?
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut url = format!(
        "{}/v1/operations/transactions?timestamp.ge={}&status=applied&select=id,amount&sort.asc=id&limit={}",
        tzkt, since, PAGE_LIMIT
    );
    if let Some(cursor) = cursor {
        url.push_str(&format!("&offset.cr={}", cursor));
    }
    Ok(url)
}
