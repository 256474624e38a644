//! Day-before appointment reminders.
//!
//! The scheduler arms a local notification for 09:00 (configurable) on the
//! day before the appointment and remembers its handle under the appointment
//! id in device storage, so a later cancellation can find it again.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kv_store::{KeyValueStore, StoreError};
use crate::models::Appointment;
use crate::notifier::{
    LocalNotifier, NotificationChannel, NotificationContent, NotificationHandle, NotifierError,
    PermissionStatus,
};

pub const DEFAULT_REMINDER_HOUR: u32 = 9;

/// Storage key of the appointment id → notification handle mapping.
pub const REMINDERS_KEY: &str = "scheduledReminders";

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("notification permission not granted")]
    PermissionDenied,
    #[error(transparent)]
    Notifier(NotifierError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<NotifierError> for ReminderError {
    fn from(e: NotifierError) -> Self {
        match e {
            NotifierError::PermissionDenied => ReminderError::PermissionDenied,
            other => ReminderError::Notifier(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderRequest {
    pub appointment_id: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time: String,
}

impl From<&Appointment> for ReminderRequest {
    fn from(a: &Appointment) -> Self {
        ReminderRequest {
            appointment_id: a.id.clone(),
            patient_name: a.patient_name.clone(),
            doctor_name: a.doctor_name.clone(),
            date: a.date,
            time: a.time.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderEntry {
    pub appointment_id: String,
    pub handle: NotificationHandle,
}

/// The day before `date`, at `hour`:00.
pub fn reminder_moment(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    let day_before = date.checked_sub_signed(Duration::days(1))?;
    let at = NaiveTime::from_hms_opt(hour, 0, 0)?;
    Some(day_before.and_time(at))
}

#[derive(Clone)]
pub struct ReminderScheduler {
    store: KeyValueStore,
    notifier: Arc<dyn LocalNotifier>,
    reminder_hour: u32,
}

impl ReminderScheduler {
    pub fn new(store: KeyValueStore, notifier: Arc<dyn LocalNotifier>, reminder_hour: u32) -> Self {
        Self {
            store,
            notifier,
            reminder_hour,
        }
    }

    pub async fn schedule(&self, req: &ReminderRequest) -> Result<Option<NotificationHandle>, ReminderError> {
        self.schedule_at(req, Local::now().naive_local()).await
    }

    /// Arm the reminder relative to `now` (device local time).
    ///
    /// Returns `Ok(None)` when the reminder moment is not strictly in the future.
    pub async fn schedule_at(
        &self,
        req: &ReminderRequest,
        now: NaiveDateTime,
    ) -> Result<Option<NotificationHandle>, ReminderError> {
        let Some(moment) = reminder_moment(req.date, self.reminder_hour) else {
            return Ok(None);
        };
        if moment <= now {
            debug!(appointment_id = %req.appointment_id, %moment, "reminder moment already passed, skipping");
            return Ok(None);
        }

        if self.notifier.permission().await != PermissionStatus::Granted {
            return Err(ReminderError::PermissionDenied);
        }

        let content = NotificationContent {
            title: "Appointment reminder".to_string(),
            body: format!(
                "You have an appointment with {} tomorrow at {}",
                req.doctor_name, req.time
            ),
            data: json!({
                "type": "appointment_reminder",
                "appointmentId": req.appointment_id,
                "screen": "appointments",
            }),
            channel: NotificationChannel::Reminders,
        };
        let handle = self.notifier.schedule(content, Some(moment)).await?;

        let mut mapping = self.load().await?;
        let previous = mapping.insert(req.appointment_id.clone(), handle.clone());
        self.store.set_json(REMINDERS_KEY, &mapping).await?;

        // mapping first; a failed disarm only leaves a stray notification behind
        if let Some(previous) = previous {
            if let Err(e) = self.notifier.cancel(&previous).await {
                warn!(appointment_id = %req.appointment_id, %previous, "failed to cancel superseded reminder: {e}");
            }
        }

        info!(appointment_id = %req.appointment_id, %handle, %moment, "reminder scheduled");
        Ok(Some(handle))
    }

    /// Disarm the reminder for `appointment_id`. Unknown ids are a no-op.
    pub async fn cancel(&self, appointment_id: &str) -> Result<(), ReminderError> {
        let mut mapping = self.load().await?;
        let Some(handle) = mapping.remove(appointment_id) else {
            return Ok(());
        };

        self.notifier.cancel(&handle).await?;
        self.store.set_json(REMINDERS_KEY, &mapping).await?;

        info!(%appointment_id, %handle, "reminder cancelled");
        Ok(())
    }

    pub async fn cancel_all(&self) -> Result<(), ReminderError> {
        self.notifier.cancel_all().await?;
        self.store.remove_item(REMINDERS_KEY).await?;
        Ok(())
    }

    pub async fn handle_for(&self, appointment_id: &str) -> Result<Option<NotificationHandle>, ReminderError> {
        Ok(self.load().await?.remove(appointment_id))
    }

    pub async fn entries(&self) -> Result<Vec<ReminderEntry>, ReminderError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|(appointment_id, handle)| ReminderEntry {
                appointment_id,
                handle,
            })
            .collect())
    }

    async fn load(&self) -> Result<BTreeMap<String, NotificationHandle>, ReminderError> {
        Ok(self
            .store
            .get_json::<BTreeMap<String, NotificationHandle>>(REMINDERS_KEY)
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{ScheduledNotification, SqliteNotifier};
    use crate::testing::test_pool;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        date(day).and_hms_opt(hour, minute, 0).unwrap()
    }

    fn request(id: &str, day: u32) -> ReminderRequest {
        ReminderRequest {
            appointment_id: id.to_string(),
            patient_name: "Sara".to_string(),
            doctor_name: "Dr. Mona".to_string(),
            date: date(day),
            time: "10:00 AM".to_string(),
        }
    }

    async fn scheduler(enabled: bool) -> (ReminderScheduler, Arc<SqliteNotifier>) {
        let pool = test_pool().await;
        let notifier = Arc::new(SqliteNotifier::new(pool.clone(), enabled));
        let scheduler = ReminderScheduler::new(
            KeyValueStore::new(pool),
            notifier.clone(),
            DEFAULT_REMINDER_HOUR,
        );
        (scheduler, notifier)
    }

    #[test]
    fn moment_is_nine_on_the_day_before() {
        assert_eq!(reminder_moment(date(20), 9), Some(at(19, 9, 0)));
        assert_eq!(
            reminder_moment(NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(), 9),
            Some(at(31, 9, 0))
        );
    }

    #[tokio::test]
    async fn tomorrow_reminder_fires_this_morning() {
        let (scheduler, notifier) = scheduler(true).await;

        // today is the 18th, appointment tomorrow: reminder today at 09:00
        let handle = scheduler
            .schedule_at(&request("apt-1", 19), at(18, 7, 30))
            .await
            .unwrap()
            .unwrap();

        let queued = notifier.list().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].handle, handle);
        assert_eq!(queued[0].fire_at, at(18, 9, 0));
        assert_eq!(queued[0].content.body, "You have an appointment with Dr. Mona tomorrow at 10:00 AM");
        assert_eq!(queued[0].content.data["appointmentId"], "apt-1");
    }

    #[tokio::test]
    async fn skipped_once_morning_has_passed() {
        let (scheduler, notifier) = scheduler(true).await;

        let handle = scheduler.schedule_at(&request("apt-1", 19), at(18, 9, 1)).await.unwrap();
        assert!(handle.is_none());
        assert!(notifier.list().await.unwrap().is_empty());
        assert!(scheduler.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn moment_equal_to_now_is_skipped() {
        let (scheduler, _) = scheduler(true).await;
        let handle = scheduler.schedule_at(&request("apt-1", 19), at(18, 9, 0)).await.unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn schedule_then_cancel_clears_mapping() {
        let (scheduler, notifier) = scheduler(true).await;

        scheduler.schedule_at(&request("apt-1", 25), at(18, 12, 0)).await.unwrap();
        assert!(scheduler.handle_for("apt-1").await.unwrap().is_some());

        scheduler.cancel("apt-1").await.unwrap();
        assert!(scheduler.handle_for("apt-1").await.unwrap().is_none());
        assert!(notifier.list().await.unwrap().is_empty());

        // second cancel is a no-op
        scheduler.cancel("apt-1").await.unwrap();
        assert!(scheduler.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_unknown_id_is_noop() {
        let (scheduler, _) = scheduler(true).await;
        scheduler.cancel("never-scheduled").await.unwrap();
    }

    #[tokio::test]
    async fn rescheduling_replaces_previous_notification() {
        let (scheduler, notifier) = scheduler(true).await;

        let first = scheduler
            .schedule_at(&request("apt-1", 25), at(18, 12, 0))
            .await
            .unwrap()
            .unwrap();
        let second = scheduler
            .schedule_at(&request("apt-1", 27), at(18, 12, 0))
            .await
            .unwrap()
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.handle_for("apt-1").await.unwrap(), Some(second.clone()));

        let queued = notifier.list().await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].handle, second);
    }

    /// Queues through SQLite but refuses to cancel anything.
    struct StickyNotifier(SqliteNotifier);

    #[async_trait::async_trait]
    impl LocalNotifier for StickyNotifier {
        async fn permission(&self) -> PermissionStatus {
            self.0.permission().await
        }

        async fn schedule(
            &self,
            content: NotificationContent,
            fire_at: Option<NaiveDateTime>,
        ) -> Result<NotificationHandle, NotifierError> {
            self.0.schedule(content, fire_at).await
        }

        async fn cancel(&self, _handle: &NotificationHandle) -> Result<(), NotifierError> {
            Err(NotifierError::Corrupt("cancel refused".to_string()))
        }

        async fn cancel_all(&self) -> Result<(), NotifierError> {
            self.0.cancel_all().await
        }

        async fn list(&self) -> Result<Vec<ScheduledNotification>, NotifierError> {
            self.0.list().await
        }
    }

    #[tokio::test]
    async fn reschedule_keeps_new_handle_when_old_cancel_fails() {
        let pool = test_pool().await;
        let notifier = Arc::new(StickyNotifier(SqliteNotifier::new(pool.clone(), true)));
        let scheduler = ReminderScheduler::new(KeyValueStore::new(pool), notifier.clone(), 9);

        scheduler.schedule_at(&request("apt-1", 25), at(18, 12, 0)).await.unwrap();
        let second = scheduler
            .schedule_at(&request("apt-1", 27), at(18, 12, 0))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(scheduler.handle_for("apt-1").await.unwrap(), Some(second.clone()));
        let queued = notifier.list().await.unwrap();
        assert!(queued.iter().any(|n| n.handle == second));
    }

    #[tokio::test]
    async fn mapping_survives_a_new_scheduler_instance() {
        let pool = test_pool().await;
        let notifier = Arc::new(SqliteNotifier::new(pool.clone(), true));
        let first = ReminderScheduler::new(KeyValueStore::new(pool.clone()), notifier.clone(), 9);
        first.schedule_at(&request("apt-1", 25), at(18, 12, 0)).await.unwrap();

        let restarted = ReminderScheduler::new(KeyValueStore::new(pool), notifier, 9);
        assert!(restarted.handle_for("apt-1").await.unwrap().is_some());
        restarted.cancel("apt-1").await.unwrap();
        assert!(restarted.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permission_denied_is_reported() {
        let (scheduler, _) = scheduler(false).await;
        let result = scheduler.schedule_at(&request("apt-1", 25), at(18, 12, 0)).await;
        assert!(matches!(result, Err(ReminderError::PermissionDenied)));
        assert!(scheduler.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_all_forgets_everything() {
        let (scheduler, notifier) = scheduler(true).await;
        scheduler.schedule_at(&request("apt-1", 25), at(18, 12, 0)).await.unwrap();
        scheduler.schedule_at(&request("apt-2", 26), at(18, 12, 0)).await.unwrap();

        scheduler.cancel_all().await.unwrap();

        assert!(scheduler.entries().await.unwrap().is_empty());
        assert!(notifier.list().await.unwrap().is_empty());
    }
}
