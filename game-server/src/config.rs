//! Runtime configuration, read once from the environment at start-up.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HANDOFF_SECRET must be set when APP_ENV=production")]
    MissingHandoffSecret,
    #[error("environment variable {key} holds an unparsable value: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything tunable about the runtime. Values not present in the
/// environment fall back to the defaults below.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Directory served as static fallback next to the websocket route.
    pub asset_dir: String,
    /// Secret for the handoff token HMAC. Optional outside production.
    pub handoff_secret: Option<String>,
    /// Seconds a player may sit on their turn before the auto action fires.
    pub action_timeout_seconds: u64,
    /// Seconds the settlement screen is held before the next round deals.
    pub display_timeout_seconds: u64,
    /// Grace between installing the second player and the first deal.
    pub start_grace_millis: u64,
    /// Seconds in queue before the low-availability notice.
    pub low_availability_seconds: u64,
    /// Seconds in queue before the computer opponent steps in.
    pub bot_fallback_seconds: u64,
    pub rate_limit_window_millis: u64,
    pub rate_limit_budget: u32,
    /// Consecutive timed-out turns before a player is treated as gone.
    pub max_idle_turns: u32,
    /// Artificial thinking pause of the computer opponent.
    pub ai_think_millis: u64,
    /// Sliding session lifetime.
    pub session_ttl_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:8080".to_string(),
            asset_dir: "public".to_string(),
            handoff_secret: None,
            action_timeout_seconds: 30,
            display_timeout_seconds: 5,
            start_grace_millis: 500,
            low_availability_seconds: 10,
            bot_fallback_seconds: 15,
            rate_limit_window_millis: 1_000,
            rate_limit_budget: 10,
            max_idle_turns: 5,
            ai_think_millis: 1_200,
            session_ttl_days: 7,
        }
    }
}

impl Config {
    /// Reads the configuration from the environment. Fails when production
    /// is declared without a handoff secret, so a misdeployed instance never
    /// comes up issuing unverifiable tokens.
    pub fn from_env() -> Result<Config, ConfigError> {
        let mut config = Config::default();

        if let Ok(addr) = env::var("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = env::var("ASSET_DIR") {
            config.asset_dir = dir;
        }
        config.handoff_secret = env::var("HANDOFF_SECRET").ok().filter(|s| !s.is_empty());

        let production = env::var("APP_ENV").is_ok_and(|v| v == "production");
        if production && config.handoff_secret.is_none() {
            return Err(ConfigError::MissingHandoffSecret);
        }

        config.action_timeout_seconds = parsed("ACTION_TIMEOUT_SECONDS", config.action_timeout_seconds)?;
        config.display_timeout_seconds = parsed("DISPLAY_TIMEOUT_SECONDS", config.display_timeout_seconds)?;
        config.start_grace_millis = parsed("START_GRACE_MILLIS", config.start_grace_millis)?;
        config.low_availability_seconds = parsed("LOW_AVAILABILITY_SECONDS", config.low_availability_seconds)?;
        config.bot_fallback_seconds = parsed("BOT_FALLBACK_SECONDS", config.bot_fallback_seconds)?;
        config.rate_limit_window_millis = parsed("RATE_LIMIT_WINDOW_MS", config.rate_limit_window_millis)?;
        config.rate_limit_budget = parsed("RATE_LIMIT_BUDGET", config.rate_limit_budget)?;
        config.max_idle_turns = parsed("MAX_IDLE_TURNS", config.max_idle_turns)?;
        config.ai_think_millis = parsed("AI_THINK_MILLIS", config.ai_think_millis)?;
        config.session_ttl_days = parsed("SESSION_TTL_DAYS", config.session_ttl_days)?;

        Ok(config)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_seconds)
    }

    pub fn display_timeout(&self) -> Duration {
        Duration::from_secs(self.display_timeout_seconds)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_millis)
    }

    pub fn low_availability(&self) -> Duration {
        Duration::from_secs(self.low_availability_seconds)
    }

    pub fn bot_fallback(&self) -> Duration {
        Duration::from_secs(self.bot_fallback_seconds)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_millis)
    }
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let config = Config::default();
        assert_eq!(config.action_timeout(), Duration::from_secs(30));
        assert_eq!(config.display_timeout(), Duration::from_secs(5));
        assert_eq!(config.low_availability(), Duration::from_secs(10));
        assert_eq!(config.bot_fallback(), Duration::from_secs(15));
        assert_eq!(config.rate_limit_window(), Duration::from_millis(1_000));
        assert_eq!(config.rate_limit_budget, 10);
    }
}
