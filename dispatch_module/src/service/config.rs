use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Email-campaign timing only needs one-minute ticker resolution.
const DEFAULT_TICKER_POLL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub campaign_db_path: PathBuf,
    pub ticker_poll_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("DISPATCH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("DISPATCH_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(9010);
        let campaign_db_path = env::var("CAMPAIGN_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state").join("campaigns.db"));
        let ticker_poll_interval = Duration::from_secs(
            env::var("TICKER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TICKER_POLL_SECS),
        );

        Self {
            host,
            port,
            campaign_db_path,
            ticker_poll_interval,
        }
    }
}
