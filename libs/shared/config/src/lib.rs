use std::env;

use chrono::NaiveTime;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub clinic_open: NaiveTime,
    pub clinic_close: NaiveTime,
    pub queue_lookahead: u32,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            jwt_secret: env::var("HOSPEASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("HOSPEASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_open: hour_from_env("CLINIC_OPEN_HOUR", 9),
            clinic_close: hour_from_env("CLINIC_CLOSE_HOUR", 18),
            queue_lookahead: env::var("QUEUE_LOOKAHEAD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}

fn hour_from_env(key: &str, default: u32) -> NaiveTime {
    let hour = env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|h| *h < 24)
        .unwrap_or_else(|| {
            warn!("{} not set or invalid, using default {}", key, default);
            default
        });

    NaiveTime::from_hms_opt(hour, 0, 0).expect("hour already range-checked")
}
