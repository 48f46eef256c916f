//! Startup configuration, read once from the environment.

use std::time::Duration;

use flatwatch_types::FlatwatchError;

/// Everything the process needs from its environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token.
    pub bot_token: String,
    /// Postgres connection URL (carries its own auth).
    pub database_url: String,
    /// Scheduled tick interval.
    pub check_interval: Duration,
    /// BYN per USD used for price-filter conversion.
    pub fx_rate_byn_usd: f64,
    /// Photos attached per listing message.
    pub max_photos: usize,
    /// Chat ids allowed to run admin commands.
    pub admin_chat_ids: Vec<i64>,
    /// Adapter names to run; defaults to every adapter the build knows.
    pub enabled_sources: Vec<String>,
    /// Fallback city slug for listings whose address names no known city.
    pub default_city: String,
}

impl Config {
    /// Read configuration from the environment (after `dotenvy` ran).
    ///
    /// # Errors
    /// Returns `Config` when a required variable is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, FlatwatchError> {
        let bot_token = required("BOT_TOKEN")?;
        let database_url = required("DATABASE_URL")?;

        let check_minutes: u64 = parse_or("CHECK_INTERVAL", 720)?;
        let fx_rate_byn_usd: f64 = parse_or("FX_RATE_BYN_USD", 2.95)?;
        let max_photos: usize = parse_or("MAX_PHOTOS", 3)?;

        let admin_chat_ids = std::env::var("ADMIN_CHAT_IDS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .collect();

        let enabled_sources = match std::env::var("ENABLED_SOURCES") {
            Ok(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => flatwatch_sources::ALL_SOURCES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        };

        let default_city = std::env::var("DEFAULT_CITY")
            .unwrap_or_else(|_| "baranovichi".to_string())
            .to_lowercase();

        Ok(Self {
            bot_token,
            database_url,
            check_interval: Duration::from_secs(check_minutes * 60),
            fx_rate_byn_usd,
            max_photos,
            admin_chat_ids,
            enabled_sources,
            default_city,
        })
    }

    /// Whether a chat id may run admin commands.
    #[must_use]
    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.admin_chat_ids.contains(&chat_id)
    }
}

fn required(name: &str) -> Result<String, FlatwatchError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FlatwatchError::config(format!("{name} is not set")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, FlatwatchError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| FlatwatchError::config(format!("{name} is not a valid number"))),
        _ => Ok(default),
    }
}
