//! Test infrastructure: an in-memory clinic backend and a wired-up harness.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;

use crate::backend::{BackendError, ClinicBackend};
use crate::gate::ConfirmationGate;
use crate::kv_store::KeyValueStore;
use crate::models::{
    Actor, AppState, Appointment, AppointmentStatus, BackendUser, ClinicInfo, Doctor,
    NewAppointment, NewOffer, Offer, PushTokenRegistration, RegisterRequest, Role,
};
use crate::notifier::SqliteNotifier;
use crate::reminders::{DEFAULT_REMINDER_HOUR, ReminderScheduler};
use crate::workflow::AppointmentWorkflow;

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::migrate(&pool).await.unwrap();
    pool
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn appointment(id: &str, patient_id: &str, status: AppointmentStatus) -> Appointment {
    Appointment {
        id: id.to_string(),
        patient_id: patient_id.to_string(),
        patient_name: "Sara".to_string(),
        patient_email: "sara@example.com".to_string(),
        patient_phone: "5550101".to_string(),
        doctor_id: "doctor_1".to_string(),
        doctor_name: "Dr. Louai Khalil".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        time: "10:00 AM".to_string(),
        notes: None,
        status,
        created_at: NaiveDate::from_ymd_opt(2026, 10, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap(),
    }
}

pub fn staff_actor(role: Role) -> Actor {
    let user_id = match role {
        Role::Doctor => "doctor_1".to_string(),
        other => format!("staff-{other}"),
    };
    Actor {
        user_id,
        role,
        name: format!("Test {role}"),
        email: "teba.s.d.center@gmail.com".to_string(),
        phone: None,
        is_guest: false,
    }
}

pub fn patient_actor(user_id: &str) -> Actor {
    Actor {
        user_id: user_id.to_string(),
        role: Role::Patient,
        name: "Omar".to_string(),
        email: "omar@example.com".to_string(),
        phone: Some("5550199".to_string()),
        is_guest: false,
    }
}

pub fn guest_actor(email: &str) -> Actor {
    Actor::guest("Guest Visitor", email, "5550123")
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    appointments: Vec<Appointment>,
    offers: Vec<Offer>,
    users: HashMap<String, (String, BackendUser)>,
    push_tokens: Vec<PushTokenRegistration>,
    calls: Vec<String>,
    fail_next_mutation: bool,
    next_id: u32,
}

/// In-memory stand-in for the clinic REST API, with a call log.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, appointment: Appointment) {
        self.state.lock().await.appointments.push(appointment);
    }

    pub async fn seed_user(&self, password: &str, user: BackendUser) {
        self.state
            .lock()
            .await
            .users
            .insert(user.email.clone(), (password.to_string(), user));
    }

    pub async fn get(&self, id: &str) -> Option<Appointment> {
        self.state
            .lock()
            .await
            .appointments
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn offers(&self) -> Vec<Offer> {
        self.state.lock().await.offers.clone()
    }

    pub async fn push_tokens(&self) -> Vec<PushTokenRegistration> {
        self.state.lock().await.push_tokens.clone()
    }

    pub async fn fail_next_mutation(&self) {
        self.state.lock().await.fail_next_mutation = true;
    }
}

fn take_failure(state: &mut MockState) -> Result<(), BackendError> {
    if std::mem::take(&mut state.fail_next_mutation) {
        return Err(BackendError::Rejected {
            status: 500,
            detail: "Internal Server Error".to_string(),
        });
    }
    Ok(())
}

fn not_found(what: &str) -> BackendError {
    BackendError::Rejected {
        status: 404,
        detail: format!("{what} not found"),
    }
}

#[async_trait]
impl ClinicBackend for MockBackend {
    async fn login(&self, email: &str, password: &str) -> Result<BackendUser, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("login {email}"));
        match state.users.get(email) {
            Some((pw, user)) if pw == password => Ok(user.clone()),
            _ => Err(BackendError::Rejected {
                status: 401,
                detail: "Invalid credentials".to_string(),
            }),
        }
    }

    async fn register(&self, req: &RegisterRequest) -> Result<BackendUser, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("register {}", req.email));
        if state.users.contains_key(&req.email) {
            return Err(BackendError::Rejected {
                status: 400,
                detail: "Email already registered".to_string(),
            });
        }
        state.next_id += 1;
        let user = BackendUser {
            id: format!("user-{}", state.next_id),
            name: req.name.clone(),
            email: req.email.clone(),
            phone: req.phone.clone(),
            role: Role::Patient,
        };
        state
            .users
            .insert(req.email.clone(), (req.password.clone(), user.clone()));
        Ok(user)
    }

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push("create".to_string());
        take_failure(&mut state)?;
        state.next_id += 1;
        let created = Appointment {
            id: format!("apt-new-{}", state.next_id),
            patient_id: new.patient_id.clone(),
            patient_name: new.patient_name.clone(),
            patient_email: new.patient_email.clone(),
            patient_phone: new.patient_phone.clone(),
            doctor_id: new.doctor_id.clone(),
            doctor_name: new.doctor_name.clone(),
            date: new.date,
            time: new.time.clone(),
            notes: new.notes.clone(),
            status: AppointmentStatus::Pending,
            created_at: Utc::now().naive_utc(),
        };
        state.appointments.push(created.clone());
        Ok(created)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push("list_all".to_string());
        Ok(state.appointments.clone())
    }

    async fn list_patient_appointments(&self, patient_id: &str) -> Result<Vec<Appointment>, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("list_patient {patient_id}"));
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn list_doctor_appointments(&self, doctor_id: &str) -> Result<Vec<Appointment>, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("list_doctor {doctor_id}"));
        Ok(state
            .appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("patch {appointment_id} {status}"));
        take_failure(&mut state)?;
        let apt = state
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| not_found("Appointment"))?;
        apt.status = status;
        Ok(())
    }

    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("delete {appointment_id}"));
        take_failure(&mut state)?;
        let before = state.appointments.len();
        state.appointments.retain(|a| a.id != appointment_id);
        if state.appointments.len() == before {
            return Err(not_found("Appointment"));
        }
        Ok(())
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, BackendError> {
        Ok(vec![
            Doctor {
                id: "doctor_1".to_string(),
                name: "Dr. Louai Khalil".to_string(),
                specialization: "Oral Surgery & Implantation".to_string(),
                description: "Consultant in Oral Surgery and Dental Implantation".to_string(),
                image: None,
            },
            Doctor {
                id: "doctor_2".to_string(),
                name: "Dr. Mona".to_string(),
                specialization: "Prosthodontics".to_string(),
                description: "Specialist in Crowns, Veneers, and Dentures".to_string(),
                image: None,
            },
        ])
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, BackendError> {
        Ok(self.state.lock().await.offers.clone())
    }

    async fn create_offer(&self, offer: &NewOffer) -> Result<Offer, BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("create_offer {}", offer.title));
        take_failure(&mut state)?;
        state.next_id += 1;
        let created = Offer {
            id: format!("offer-{}", state.next_id),
            title: offer.title.clone(),
            description: offer.description.clone(),
            discount: offer.discount.clone(),
            valid_until: offer.valid_until.clone(),
        };
        state.offers.push(created.clone());
        Ok(created)
    }

    async fn delete_offer(&self, offer_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("delete_offer {offer_id}"));
        take_failure(&mut state)?;
        let before = state.offers.len();
        state.offers.retain(|o| o.id != offer_id);
        if state.offers.len() == before {
            return Err(not_found("Offer"));
        }
        Ok(())
    }

    async fn clinic_info(&self) -> Result<ClinicInfo, BackendError> {
        Ok(ClinicInfo {
            name: "TEBA SPECIALIZED DENTAL CENTER".to_string(),
            address: "Abu Hamour, Doha, Qatar".to_string(),
            phone: "44163344".to_string(),
            fax: None,
            mobile: None,
            whatsapp: None,
            email: "teba.s.d.center@gmail.com".to_string(),
            instagram: None,
            facebook: None,
            google_maps: None,
            description: None,
        })
    }

    async fn register_push_token(&self, reg: &PushTokenRegistration) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("push_token {}", reg.user_id));
        state.push_tokens.push(reg.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Everything `AppState` needs, wired against `MockBackend` and in-memory SQLite.
pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub notifier: Arc<SqliteNotifier>,
    pub reminders: ReminderScheduler,
    pub workflow: Arc<AppointmentWorkflow>,
    pub state: AppState,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_notifications(true).await
    }

    pub async fn with_notifications(enabled: bool) -> Self {
        let pool = test_pool().await;
        let backend = Arc::new(MockBackend::new());
        let kv = KeyValueStore::new(pool.clone());
        let notifier = Arc::new(SqliteNotifier::new(pool.clone(), enabled));
        let reminders = ReminderScheduler::new(kv.clone(), notifier.clone(), DEFAULT_REMINDER_HOUR);
        let workflow = Arc::new(AppointmentWorkflow::new(backend.clone(), reminders.clone()));

        let state = AppState {
            db: pool,
            session_ttl_hours: 24,
            device_platform: "linux".to_string(),
            backend: backend.clone(),
            kv,
            notifier: notifier.clone(),
            reminders: reminders.clone(),
            workflow: workflow.clone(),
            gate: Arc::new(ConfirmationGate::new()),
        };

        Self {
            backend,
            notifier,
            reminders,
            workflow,
            state,
        }
    }
}
