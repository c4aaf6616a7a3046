// ⚙️ Configuration - environment driven
// Every knob has a default so a bare `sakan-server` starts against ./sakan.db

use anyhow::{anyhow, Result};
use std::{env, fmt::Display, str::FromStr};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Base URL used when building links in e-mails
    pub public_url: String,
    pub session_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    pub otp_max_attempts: i64,
    pub onboarding_ttl_hours: i64,
    /// ISO 4217 code shown on receipts and reminders
    pub currency: String,
    pub cookie_secure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            database_path: "sakan.db".to_string(),
            public_url: "http://localhost:3000".to_string(),
            session_ttl_hours: 720,
            otp_ttl_minutes: 10,
            otp_max_attempts: 5,
            onboarding_ttl_hours: 72,
            currency: "MAD".to_string(),
            cookie_secure: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            port: try_load("SAKAN_PORT", defaults.port)?,
            database_path: try_load("SAKAN_DATABASE", defaults.database_path)?,
            public_url: try_load::<String>("SAKAN_PUBLIC_URL", defaults.public_url)?
                .trim_end_matches('/')
                .to_string(),
            session_ttl_hours: try_load("SAKAN_SESSION_TTL_HOURS", defaults.session_ttl_hours)?,
            otp_ttl_minutes: try_load("SAKAN_OTP_TTL_MINUTES", defaults.otp_ttl_minutes)?,
            otp_max_attempts: try_load("SAKAN_OTP_MAX_ATTEMPTS", defaults.otp_max_attempts)?,
            onboarding_ttl_hours: try_load(
                "SAKAN_ONBOARDING_TTL_HOURS",
                defaults.onboarding_ttl_hours,
            )?,
            currency: try_load("SAKAN_CURRENCY", defaults.currency)?,
            cookie_secure: try_load("SAKAN_COOKIE_SECURE", defaults.cookie_secure)?,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
