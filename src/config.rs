use std::env;

use anyhow::{anyhow, bail};

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_url: String,
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub notifications_enabled: bool,
    pub reminder_hour: u32,
    pub notification_poll_secs: u64,
    pub device_platform: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("CLINIC_BACKEND_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("CLINIC_BACKEND_URL must be set"))?;
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://teba-booking.db".to_string());
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let session_ttl_hours = lookup("SESSION_TTL_HOURS")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let notifications_enabled = lookup("NOTIFICATIONS_ENABLED")
            .map(|s| !matches!(s.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        let reminder_hour = match lookup("REMINDER_HOUR") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| anyhow!("REMINDER_HOUR: {e}"))?,
            None => crate::reminders::DEFAULT_REMINDER_HOUR,
        };
        if reminder_hour > 23 {
            bail!("REMINDER_HOUR must be between 0 and 23, got {reminder_hour}");
        }

        let notification_poll_secs = lookup("NOTIFICATION_POLL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);
        let device_platform =
            lookup("DEVICE_PLATFORM").unwrap_or_else(|| env::consts::OS.to_string());

        Ok(Self {
            backend_url,
            database_url,
            bind_addr,
            session_ttl_hours,
            notifications_enabled,
            reminder_hour,
            notification_poll_secs,
            device_platform,
        })
    }
}
