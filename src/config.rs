use clap::Parser;
use std::time::Duration;

use crate::worker::LiveMonitorConfig;

/// Football fixture worker: live scores, event enrichment and prediction settlement
#[derive(Parser, Debug, Clone)]
#[command(name = "matchday-worker", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "matchday.db")]
    pub database_path: String,

    /// Sync API listen address
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8000")]
    pub http_addr: String,

    /// FotMob data API base URL
    #[arg(
        long,
        env = "FOTMOB_API_URL",
        default_value = "https://www.fotmob.com/api/data"
    )]
    pub fotmob_api_url: String,

    /// Tracked league ids (domestic leagues and cups, UEFA, CONMEBOL, FIFA)
    #[arg(
        long,
        env = "TARGET_LEAGUE_IDS",
        value_delimiter = ',',
        default_value = "54,209,8924,87,138,139,53,134,207,47,132,133,247,55,141,222,42,73,10216,74,50,9806,45,44,78,10703,10304,66,77"
    )]
    pub league_ids: Vec<i64>,

    /// Pause after a live-monitor cycle that saw live fixtures
    #[arg(long, env = "LIVE_INTERVAL_ACTIVE_SECS", default_value = "30")]
    pub live_interval_active_secs: u64,

    /// Pause after a live-monitor cycle with nothing live
    #[arg(long, env = "LIVE_INTERVAL_IDLE_SECS", default_value = "300")]
    pub live_interval_idle_secs: u64,

    /// Pause after a failed live-monitor cycle
    #[arg(long, env = "LIVE_RECOVERY_SECS", default_value = "20")]
    pub live_recovery_secs: u64,

    /// Settlement sweep period
    #[arg(long, env = "SETTLEMENT_TICK_SECS", default_value = "10")]
    pub settlement_tick_secs: u64,

    /// Re-settlement delays after each attempt; an entry retires once exhausted
    #[arg(
        long,
        env = "SETTLEMENT_BACKOFF_SECS",
        value_delimiter = ',',
        default_value = "120,600"
    )]
    pub settlement_backoff_secs: Vec<u64>,

    /// Maximum concurrent fixture detail requests
    #[arg(long, env = "ENRICHMENT_CONCURRENCY", default_value = "6")]
    pub enrichment_concurrency: usize,

    /// Local hour of the daily backfill
    #[arg(long, env = "BACKFILL_HOUR", default_value = "5")]
    pub backfill_hour: u32,

    /// Days before today re-read by the backfill
    #[arg(long, env = "BACKFILL_DAYS", default_value = "3")]
    pub backfill_days: u32,

    /// Local hour of the daily season-schedule seed
    #[arg(long, env = "FUTURE_SEED_HOUR", default_value = "3")]
    pub future_seed_hour: u32,

    /// Pause between leagues during the seed
    #[arg(long, env = "SEED_LEAGUE_PAUSE_SECS", default_value = "2")]
    pub seed_league_pause_secs: u64,

    /// HTTP timeout for FotMob requests
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.league_ids.is_empty() {
            anyhow::bail!("TARGET_LEAGUE_IDS must name at least one league");
        }
        for (name, hour) in [
            ("BACKFILL_HOUR", self.backfill_hour),
            ("FUTURE_SEED_HOUR", self.future_seed_hour),
        ] {
            if hour >= 24 {
                anyhow::bail!("{} must be between 0 and 23, got {}", name, hour);
            }
        }
        for (name, secs) in [
            ("LIVE_INTERVAL_ACTIVE_SECS", self.live_interval_active_secs),
            ("LIVE_INTERVAL_IDLE_SECS", self.live_interval_idle_secs),
            ("LIVE_RECOVERY_SECS", self.live_recovery_secs),
            ("SETTLEMENT_TICK_SECS", self.settlement_tick_secs),
            ("REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be positive", name);
            }
        }
        if self.enrichment_concurrency == 0 {
            anyhow::bail!("ENRICHMENT_CONCURRENCY must be positive");
        }
        if self.backfill_days == 0 {
            anyhow::bail!("BACKFILL_DAYS must be positive");
        }
        if self.settlement_backoff_secs.windows(2).any(|w| w[0] > w[1]) {
            anyhow::bail!(
                "SETTLEMENT_BACKOFF_SECS must be ascending, got {:?}",
                self.settlement_backoff_secs
            );
        }
        Ok(())
    }

    pub fn settlement_backoff(&self) -> Vec<Duration> {
        self.settlement_backoff_secs
            .iter()
            .map(|&s| Duration::from_secs(s))
            .collect()
    }

    pub fn live_monitor_config(&self) -> LiveMonitorConfig {
        LiveMonitorConfig {
            active_interval: Duration::from_secs(self.live_interval_active_secs),
            idle_interval: Duration::from_secs(self.live_interval_idle_secs),
            recovery_interval: Duration::from_secs(self.live_recovery_secs),
            concurrency: self.enrichment_concurrency,
        }
    }
}
