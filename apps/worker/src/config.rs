use std::path::PathBuf;
use std::time::Duration;

use ledgersync_connect::SyncConfig;

pub struct Config {
    /// Directory holding the SQLite file (`DATABASE_URL` overrides the file)
    pub data_dir: String,
    /// One `<provider item id>.json` payload per item
    pub drop_dir: PathBuf,
    pub sync_interval: Duration,
    pub initial_delay: Duration,
    /// Upper bound on one item sync, account recomputes included
    pub run_deadline: Duration,
    pub log_format: String,
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: u64| {
            Duration::from_secs(
                lookup(key)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(default),
            )
        };
        let days = |key: &str, default: i64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let defaults = SyncConfig::default();

        Self {
            data_dir: lookup("LEDGERSYNC_DATA_DIR").unwrap_or_else(|| "./data".into()),
            drop_dir: lookup("LEDGERSYNC_DROP_DIR")
                .unwrap_or_else(|| "./data/drop".into())
                .into(),
            sync_interval: secs("LEDGERSYNC_SYNC_INTERVAL_SECS", 4 * 60 * 60),
            initial_delay: secs("LEDGERSYNC_INITIAL_DELAY_SECS", 10),
            run_deadline: secs("LEDGERSYNC_RUN_DEADLINE_SECS", 15 * 60),
            log_format: lookup("LEDGERSYNC_LOG_FORMAT").unwrap_or_else(|| "text".into()),
            sync: SyncConfig {
                gateway_timeout: secs(
                    "LEDGERSYNC_GATEWAY_TIMEOUT_SECS",
                    defaults.gateway_timeout.as_secs(),
                ),
                simplefin_lookback_days: days(
                    "LEDGERSYNC_SIMPLEFIN_LOOKBACK_DAYS",
                    defaults.simplefin_lookback_days,
                ),
                initial_history_days: days(
                    "LEDGERSYNC_INITIAL_HISTORY_DAYS",
                    defaults.initial_history_days,
                ),
            },
        }
    }
}
