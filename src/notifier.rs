//! Local notification queue.
//!
//! Notifications are persisted so a reminder armed days ahead survives a
//! restart; a dispatcher task delivers whatever has come due.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FIRE_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Opaque id returned by the notification system for a scheduled notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationHandle(pub String);

impl std::fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Default,
    Appointments,
    Offers,
    Reminders,
}

impl NotificationChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationChannel::Default => "default",
            NotificationChannel::Appointments => "appointments",
            NotificationChannel::Offers => "offers",
            NotificationChannel::Reminders => "reminders",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "appointments" => NotificationChannel::Appointments,
            "offers" => NotificationChannel::Offers,
            "reminders" => NotificationChannel::Reminders,
            _ => NotificationChannel::Default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub data: Value,
    pub channel: NotificationChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledNotification {
    pub handle: NotificationHandle,
    pub content: NotificationContent,
    pub fire_at: NaiveDateTime,
    pub delivered_at: Option<NaiveDateTime>,
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notification permission not granted")]
    PermissionDenied,
    #[error("notification storage error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("notification payload error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt notification row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait LocalNotifier: Send + Sync {
    async fn permission(&self) -> PermissionStatus;

    /// Queue a one-shot notification at `fire_at` (local time); `None` fires immediately.
    async fn schedule(
        &self,
        content: NotificationContent,
        fire_at: Option<NaiveDateTime>,
    ) -> Result<NotificationHandle, NotifierError>;

    /// Cancelling an unknown or already delivered handle is not an error.
    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotifierError>;

    async fn cancel_all(&self) -> Result<(), NotifierError>;

    async fn list(&self) -> Result<Vec<ScheduledNotification>, NotifierError>;
}

pub struct SqliteNotifier {
    pool: SqlitePool,
    permission: PermissionStatus,
}

impl SqliteNotifier {
    pub fn new(pool: SqlitePool, enabled: bool) -> Self {
        let permission = if enabled {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        };
        Self { pool, permission }
    }

    /// Mark every notification due at `now` as delivered and return them.
    pub async fn deliver_due(&self, now: NaiveDateTime) -> Result<Vec<ScheduledNotification>, NotifierError> {
        let rows = sqlx::query(
            r#"
            SELECT handle, channel, title, body, data, fire_at, delivered_at
            FROM local_notification
            WHERE delivered_at IS NULL AND fire_at <= ?
            ORDER BY fire_at ASC
            "#,
        )
        .bind(now.format(FIRE_AT_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut delivered = Vec::with_capacity(rows.len());
        for row in rows {
            let mut notification = row_to_notification(&row)?;
            sqlx::query("UPDATE local_notification SET delivered_at = ? WHERE handle = ?")
                .bind(now.format(FIRE_AT_FORMAT).to_string())
                .bind(&notification.handle.0)
                .execute(&self.pool)
                .await?;
            notification.delivered_at = Some(now);

            info!(
                handle = %notification.handle,
                channel = notification.content.channel.as_str(),
                title = %notification.content.title,
                "local notification delivered"
            );
            delivered.push(notification);
        }
        Ok(delivered)
    }
}

#[async_trait]
impl LocalNotifier for SqliteNotifier {
    async fn permission(&self) -> PermissionStatus {
        self.permission
    }

    async fn schedule(
        &self,
        content: NotificationContent,
        fire_at: Option<NaiveDateTime>,
    ) -> Result<NotificationHandle, NotifierError> {
        if self.permission != PermissionStatus::Granted {
            return Err(NotifierError::PermissionDenied);
        }

        let handle = NotificationHandle(Uuid::new_v4().to_string());
        let fire_at = fire_at.unwrap_or_else(|| Local::now().naive_local());

        sqlx::query(
            r#"
            INSERT INTO local_notification (handle, channel, title, body, data, fire_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&handle.0)
        .bind(content.channel.as_str())
        .bind(&content.title)
        .bind(&content.body)
        .bind(serde_json::to_string(&content.data)?)
        .bind(fire_at.format(FIRE_AT_FORMAT).to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(%handle, %fire_at, "local notification scheduled");
        Ok(handle)
    }

    async fn cancel(&self, handle: &NotificationHandle) -> Result<(), NotifierError> {
        sqlx::query("DELETE FROM local_notification WHERE handle = ? AND delivered_at IS NULL")
            .bind(&handle.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_all(&self) -> Result<(), NotifierError> {
        sqlx::query("DELETE FROM local_notification WHERE delivered_at IS NULL")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ScheduledNotification>, NotifierError> {
        let rows = sqlx::query(
            r#"
            SELECT handle, channel, title, body, data, fire_at, delivered_at
            FROM local_notification
            ORDER BY fire_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }
}

fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledNotification, NotifierError> {
    let handle: String = row.try_get("handle")?;
    let channel: String = row.try_get("channel")?;
    let title: String = row.try_get("title")?;
    let body: String = row.try_get("body")?;
    let data: String = row.try_get("data")?;
    let fire_at: String = row.try_get("fire_at")?;
    let delivered_at: Option<String> = row.try_get("delivered_at")?;

    Ok(ScheduledNotification {
        handle: NotificationHandle(handle),
        content: NotificationContent {
            title,
            body,
            data: serde_json::from_str(&data)?,
            channel: NotificationChannel::parse(&channel),
        },
        fire_at: parse_fire_at(&fire_at)?,
        delivered_at: delivered_at.as_deref().map(parse_fire_at).transpose()?,
    })
}

fn parse_fire_at(raw: &str) -> Result<NaiveDateTime, NotifierError> {
    NaiveDateTime::parse_from_str(raw, FIRE_AT_FORMAT)
        .map_err(|e| NotifierError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

/// Poll for due notifications every `every`, delivering them in local time.
pub fn spawn_dispatcher(notifier: std::sync::Arc<SqliteNotifier>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = notifier.deliver_due(Local::now().naive_local()).await {
                warn!("notification dispatch failed: {e}");
            }
        }
    })
}
