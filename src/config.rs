use std::time::Duration;

use clap::Args;

/// Runtime settings shared by every command. Each flag falls back to an
/// environment variable so the binary can run unattended.
#[derive(Args, Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "STUDIO_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Upper bound for one dashboard load, all reads included
    #[arg(long, env = "STUDIO_QUERY_TIMEOUT_SECS", default_value_t = 15)]
    pub query_timeout_secs: u64,

    /// Base URL of the functions host running the invoice sync
    #[arg(long, env = "STUDIO_FUNCTIONS_URL")]
    pub functions_url: Option<String>,

    #[arg(long, env = "STUDIO_FUNCTIONS_TOKEN", hide_env_values = true)]
    pub functions_token: Option<String>,

    /// Age of `last_gi_sync_at` after which a load triggers a sync
    #[arg(long, env = "STUDIO_SYNC_STALE_AFTER_MINS", default_value_t = 60)]
    pub sync_stale_after_mins: i64,
}

impl AppConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }

    /// Values past chrono's range saturate, so the sync is never considered stale.
    pub fn sync_stale_after(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.sync_stale_after_mins.max(0))
            .unwrap_or(chrono::Duration::MAX)
    }
}
