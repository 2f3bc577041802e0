use crate::db::DbPool;
use crate::types::config::PipelineConfig;
use tracing::warn;

pub const ENV_TZKT_URL: &str = "TEZPULSE_TZKT_URL";
pub const ENV_RPC_URL: &str = "TEZPULSE_RPC_URL";
pub const ENV_POLL_SECS: &str = "TEZPULSE_POLL_SECS";

pub fn config_get_db(pool: &DbPool) -> Result<String, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    let result: Option<String> = conn
        .query_row("SELECT value FROM config WHERE key = 'main'", [], |row| row.get(0))
        .ok();
    Ok(result.unwrap_or_else(|| "{}".to_string()))
}

pub fn config_set_db(pool: &DbPool, json: &str) -> Result<(), String> {
    let conn = pool.get().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO config (key, value) VALUES ('main', ?1)
         ON CONFLICT(key) DO UPDATE SET value = ?1, updated_at = datetime('now')",
        [json],
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}

/// Deep-merge `patch_json` into the stored document. The merged document must
/// still describe a valid `PipelineConfig`, otherwise nothing is written.
pub fn config_update_db(pool: &DbPool, patch_json: &str) -> Result<String, String> {
    let current = config_get_db(pool)?;
    let mut current_val: serde_json::Value =
        serde_json::from_str(&current).map_err(|e| e.to_string())?;
    let patch_val: serde_json::Value =
        serde_json::from_str(patch_json).map_err(|e| e.to_string())?;

    merge_json(&mut current_val, &patch_val);
    serde_json::from_value::<PipelineConfig>(current_val.clone())
        .map_err(|e| format!("invalid config: {}", e))?;
    let merged = serde_json::to_string(&current_val).map_err(|e| e.to_string())?;
    config_set_db(pool, &merged)?;
    Ok(merged)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) =
        (base, patch)
    {
        for (key, value) in patch_map {
            match base_map.get_mut(key) {
                Some(existing) if value.is_object() && existing.is_object() => {
                    merge_json(existing, value)
                }
                _ => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Stored config with environment overrides applied. A missing or corrupt
/// document yields the defaults.
pub fn load_config(pool: &DbPool) -> PipelineConfig {
    let stored = match config_get_db(pool) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "Stored config is invalid, using defaults");
            PipelineConfig::default()
        }),
        Err(e) => {
            warn!(error = %e, "Failed to read config, using defaults");
            PipelineConfig::default()
        }
    };
    apply_env_overrides(stored, |key| std::env::var(key).ok())
}

pub fn apply_env_overrides(
    mut config: PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> PipelineConfig {
    if let Some(url) = lookup(ENV_TZKT_URL).filter(|v| !v.trim().is_empty()) {
        config.tzkt_url = url.trim().to_string();
    }
    if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.trim().is_empty()) {
        config.rpc_url = url.trim().to_string();
    }
    if let Some(raw) = lookup(ENV_POLL_SECS) {
        match raw.trim().parse::<u64>() {
            Ok(secs) => config.poll_interval_secs = secs,
            Err(_) => warn!(key = ENV_POLL_SECS, value = %raw, "Ignoring non-numeric override"),
        }
    }
    config
}
