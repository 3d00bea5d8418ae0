use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub classifier: ClassifierConfig,
    pub lifecycle: LifecycleConfig,
}

pub struct ClassifierConfig {
    pub url: String,
    pub call_timeout: Duration,
}

pub struct LifecycleConfig {
    pub tick_interval: Duration,
    pub grace_days: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/fieldday".to_string()),
            port: env_parsed("PORT", 3001),
            classifier: ClassifierConfig {
                url: env::var("CLASSIFIER_URL")
                    .unwrap_or_else(|_| "http://localhost:8700/classify".to_string()),
                call_timeout: Duration::from_secs(env_parsed("CLASSIFIER_TIMEOUT_SECS", 5)),
            },
            lifecycle: LifecycleConfig {
                tick_interval: Duration::from_secs(env_parsed(
                    "LIFECYCLE_TICK_INTERVAL_SECS",
                    3600,
                )),
                grace_days: env_parsed("LIFECYCLE_GRACE_DAYS", 14),
            },
        }
    }
}

/// Read an env var and parse it, falling back to `default` when the var is
/// unset or unparseable. A bad value is logged rather than taken as fatal.
fn env_parsed<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
