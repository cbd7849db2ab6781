//! Resolves `CONFIG_LOCATION` (`file://` or `http(s)://`) into a
//! [`Datalayer`] and runs the periodic refresh loop described by
//! `CONFIG_REFRESH_INTERVAL`.

use std::sync::Arc;
use std::time::Duration;

use common::err::{CResult, DatalayerError};
use datalayer::Datalayer;

use crate::state::AppState;

pub async fn load_datalayer(location: &str) -> CResult<Datalayer> {
    let bytes = fetch(location).await?;
    Datalayer::from_json(&bytes)
}

async fn fetch(location: &str) -> CResult<Vec<u8>> {
    if let Some(path) = location.strip_prefix("file://") {
        std::fs::read(path).map_err(DatalayerError::from)
    } else if location.starts_with("http://") || location.starts_with("https://") {
        let response = reqwest::get(location)
            .await
            .map_err(|e| DatalayerError::InvalidConfig(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DatalayerError::InvalidConfig(e.to_string()))?;
        Ok(bytes.to_vec())
    } else {
        Err(DatalayerError::InvalidConfig(format!(
            "unsupported CONFIG_LOCATION scheme: {location}"
        )))
    }
}

/// Parses a cron-ish `@every <n><unit>` spec (`s`/`m`/`h`), falling back
/// to 60s for anything it doesn't recognize rather than failing startup
/// over a malformed refresh interval.
pub fn parse_refresh_interval(spec: &str) -> Duration {
    let body = spec.trim().strip_prefix("@every").unwrap_or(spec).trim();
    parse_duration(body).unwrap_or(Duration::from_secs(60))
}

fn parse_duration(s: &str) -> Option<Duration> {
    if s.len() < 2 {
        return None;
    }
    let (num, unit) = s.split_at(s.len() - 1);
    let n: u64 = num.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

/// Spawns the background task that re-fetches `location` every `interval`
/// and swaps it into `state` when the digest changes. Fetch failures are
/// logged and skipped; the previously loaded configuration stays active.
pub fn spawn_refresh_task(state: Arc<AppState>, location: String, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match load_datalayer(&location).await {
                Ok(fresh) => {
                    if state.replace_if_changed(fresh).await {
                        tracing::info!("configuration reloaded from {location}");
                    }
                }
                Err(e) => tracing::warn!("failed to refresh configuration from {location}: {e}"),
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_every_seconds() {
        assert_eq!(parse_refresh_interval("@every 30s"), Duration::from_secs(30));
    }

    #[test]
    fn parses_every_minutes() {
        assert_eq!(parse_refresh_interval("@every 5m"), Duration::from_secs(300));
    }

    #[test]
    fn falls_back_on_unrecognized_spec() {
        assert_eq!(parse_refresh_interval("nonsense"), Duration::from_secs(60));
    }
}
