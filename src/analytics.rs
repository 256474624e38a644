//! Dashboard counts and the admin backup snapshot.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Appointment, AppointmentStatus, ClinicInfo, Doctor};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppointmentStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub this_month: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub completed: usize,
    pub cancelled: usize,
}

/// Weeks run Sunday through Saturday.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
    (start, start + Duration::days(6))
}

pub fn compute_stats(appointments: &[Appointment], today: NaiveDate) -> AppointmentStats {
    let (week_start, week_end) = week_bounds(today);

    let mut stats = AppointmentStats {
        total: appointments.len(),
        ..Default::default()
    };
    for apt in appointments {
        if apt.date == today {
            stats.today += 1;
        }
        if apt.date >= week_start && apt.date <= week_end {
            stats.this_week += 1;
        }
        if apt.date.year() == today.year() && apt.date.month() == today.month() {
            stats.this_month += 1;
        }
        match apt.status {
            AppointmentStatus::Pending => stats.pending += 1,
            AppointmentStatus::Confirmed => stats.confirmed += 1,
            AppointmentStatus::Completed => stats.completed += 1,
            AppointmentStatus::Cancelled => stats.cancelled += 1,
        }
    }
    stats
}

#[derive(Debug, Serialize)]
pub struct BackupSnapshot {
    pub exported_at: DateTime<Utc>,
    pub clinic: ClinicInfo,
    pub doctors: Vec<Doctor>,
    pub appointments: Vec<Appointment>,
    pub stats: AppointmentStats,
}

impl BackupSnapshot {
    /// `today` is the clinic's calendar day, not the UTC one.
    pub fn new(
        clinic: ClinicInfo,
        doctors: Vec<Doctor>,
        appointments: Vec<Appointment>,
        today: NaiveDate,
    ) -> Self {
        let exported_at = Utc::now();
        let stats = compute_stats(&appointments, today);
        Self {
            exported_at,
            clinic,
            doctors,
            appointments,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::appointment;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn on(id: &str, date: NaiveDate, status: AppointmentStatus) -> Appointment {
        let mut apt = appointment(id, "user-7", status);
        apt.date = date;
        apt
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2026-10-18 is a Sunday
        assert_eq!(week_bounds(day(10, 18)), (day(10, 18), day(10, 24)));
        assert_eq!(week_bounds(day(10, 21)), (day(10, 18), day(10, 24)));
        assert_eq!(week_bounds(day(10, 17)), (day(10, 11), day(10, 17)));
    }

    #[test]
    fn counts_by_period_and_status() {
        let today = day(10, 21);
        let appointments = vec![
            on("a", day(10, 21), AppointmentStatus::Pending),
            on("b", day(10, 24), AppointmentStatus::Confirmed),
            on("c", day(10, 25), AppointmentStatus::Confirmed),
            on("d", day(10, 2), AppointmentStatus::Completed),
            on("e", day(11, 1), AppointmentStatus::Cancelled),
        ];

        let stats = compute_stats(&appointments, today);
        assert_eq!(
            stats,
            AppointmentStats {
                total: 5,
                today: 1,
                this_week: 2,
                this_month: 4,
                pending: 1,
                confirmed: 2,
                completed: 1,
                cancelled: 1,
            }
        );
    }

    #[tokio::test]
    async fn backup_stats_use_the_given_day() {
        use crate::backend::ClinicBackend;
        use crate::testing::MockBackend;

        let backend = MockBackend::new();
        let clinic = backend.clinic_info().await.unwrap();
        let doctors = backend.list_doctors().await.unwrap();
        let appointments = vec![
            on("a", day(10, 21), AppointmentStatus::Pending),
            on("b", day(10, 22), AppointmentStatus::Confirmed),
        ];

        let snapshot = BackupSnapshot::new(clinic, doctors, appointments, day(10, 22));
        assert_eq!(snapshot.stats.today, 1);
        assert_eq!(snapshot.stats.this_week, 2);
        assert_eq!(snapshot.stats, compute_stats(&snapshot.appointments, day(10, 22)));
    }

    #[test]
    fn empty_list_is_all_zero() {
        assert_eq!(compute_stats(&[], day(10, 21)), AppointmentStats::default());
    }
}
