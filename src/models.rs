use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::backend::ClinicBackend;
use crate::gate::ConfirmationGate;
use crate::kv_store::KeyValueStore;
use crate::notifier::LocalNotifier;
use crate::reminders::ReminderScheduler;
use crate::workflow::AppointmentWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub session_ttl_hours: i64,
    pub device_platform: String,
    pub backend: Arc<dyn ClinicBackend>,
    pub kv: KeyValueStore,
    pub notifier: Arc<dyn LocalNotifier>,
    pub reminders: ReminderScheduler,
    pub workflow: Arc<AppointmentWorkflow>,
    pub gate: Arc<ConfirmationGate<PendingAction>>,
}

/// `patient_id` carried by bookings made without an account.
pub const GUEST_PATIENT_ID: &str = "guest";

/* -------------------------
   Roles & status
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Nurse,
    Receptionist,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Receptionist => "receptionist",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(self) -> bool {
        !matches!(self, Role::Patient)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "nurse" => Ok(Role::Nurse),
            "receptionist" => Ok(Role::Receptionist),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------
   Actor (who is acting through a session)
--------------------------*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_guest: bool,
}

impl Actor {
    pub fn guest(name: &str, email: &str, phone: &str) -> Self {
        Actor {
            user_id: GUEST_PATIENT_ID.to_string(),
            role: Role::Patient,
            name: name.trim().to_string(),
            email: normalize_email(email),
            phone: Some(phone.trim().to_string()),
            is_guest: true,
        }
    }

    /// Guests share the sentinel patient id, so their bookings are told apart by email.
    pub fn owns(&self, appointment: &Appointment) -> bool {
        if self.is_guest {
            appointment.patient_id == GUEST_PATIENT_ID
                && normalize_email(&appointment.patient_email) == self.email
        } else {
            appointment.patient_id == self.user_id
        }
    }

    /// The `patient_id` this actor's own bookings are filed under.
    pub fn patient_id(&self) -> &str {
        if self.is_guest {
            GUEST_PATIENT_ID
        } else {
            &self.user_id
        }
    }
}

impl From<BackendUser> for Actor {
    fn from(u: BackendUser) -> Self {
        Actor {
            user_id: u.id,
            role: u.role,
            name: u.name,
            email: normalize_email(&u.email),
            phone: u.phone,
            is_guest: false,
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/* -------------------------
   Backend records
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAppointment {
    pub patient_id: String,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub description: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub title: String,
    pub description: String,
    pub discount: String,
    pub valid_until: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOffer {
    pub title: String,
    pub description: String,
    pub discount: String,
    pub valid_until: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub fax: Option<String>,
    pub mobile: Option<String>,
    pub whatsapp: Option<String>,
    pub email: String,
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub google_maps: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushTokenRegistration {
    pub token: String,
    pub user_id: String,
    pub user_role: Role,
    pub platform: String,
}

/* -------------------------
   Gated actions
--------------------------*/

/// A mutation parked behind a confirmation dialog until the user accepts it.
#[derive(Debug, Clone)]
pub enum PendingAction {
    Transition {
        appointment_id: String,
        target: AppointmentStatus,
    },
    CreateOffer(NewOffer),
    DeleteOffer {
        offer_id: String,
    },
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GuestRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponseData {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Actor,
}

#[derive(Debug, Serialize)]
pub struct MeResponseData {
    pub user: Actor,
    pub session_token_id: uuid::Uuid,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub session_token_id: String,
    pub user_id: String,
    pub role: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_guest: bool,
    pub expires_at: String,
    pub revoked_at: Option<String>,
}

impl SessionRow {
    pub fn actor(&self) -> Result<Actor, String> {
        Ok(Actor {
            user_id: self.user_id.clone(),
            role: self.role.parse()?,
            name: self.display_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            is_guest: self.is_guest,
        })
    }
}
