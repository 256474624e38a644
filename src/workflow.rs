//! Appointment flows shared by every screen: fetch the actor's list, book,
//! and request status transitions.
//!
//! Each session keeps a board, the last list fetched from the backend. It is
//! replaced wholesale on refresh and never edited in place, so a failed
//! mutation leaves the last known-good list untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, ClinicBackend};
use crate::lifecycle::{self, AppointmentAction, LifecycleError};
use crate::models::{Actor, Appointment, AppointmentStatus, GUEST_PATIENT_ID, NewAppointment, Role};
use crate::reminders::{ReminderRequest, ReminderScheduler};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("appointment {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub doctor_id: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

pub struct AppointmentWorkflow {
    backend: Arc<dyn ClinicBackend>,
    reminders: ReminderScheduler,
    boards: RwLock<HashMap<Uuid, Vec<Appointment>>>,
}

impl AppointmentWorkflow {
    pub fn new(backend: Arc<dyn ClinicBackend>, reminders: ReminderScheduler) -> Self {
        Self {
            backend,
            reminders,
            boards: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the actor's appointments from the backend and replace the board.
    pub async fn refresh(&self, session_id: Uuid, actor: &Actor) -> Result<Vec<Appointment>, WorkflowError> {
        let appointments = self.fetch_for(actor).await?;
        self.boards
            .write()
            .await
            .insert(session_id, appointments.clone());
        Ok(appointments)
    }

    pub async fn board(&self, session_id: Uuid) -> Option<Vec<Appointment>> {
        self.boards.read().await.get(&session_id).cloned()
    }

    pub async fn forget(&self, session_id: Uuid) {
        self.boards.write().await.remove(&session_id);
    }

    /// Drop the boards of every session not in `live`.
    pub async fn retain_sessions(&self, live: &HashSet<Uuid>) {
        self.boards.write().await.retain(|id, _| live.contains(id));
    }

    async fn fetch_for(&self, actor: &Actor) -> Result<Vec<Appointment>, BackendError> {
        match actor.role {
            Role::Patient if actor.is_guest => {
                // guests share one patient id; only their own email identifies their bookings
                let all = self.backend.list_patient_appointments(GUEST_PATIENT_ID).await?;
                Ok(all.into_iter().filter(|a| actor.owns(a)).collect())
            }
            Role::Patient => self.backend.list_patient_appointments(&actor.user_id).await,
            Role::Doctor => self.backend.list_doctor_appointments(&actor.user_id).await,
            Role::Nurse | Role::Receptionist | Role::Admin => self.backend.list_appointments().await,
        }
    }

    /// Find an appointment on the board, refreshing once if it is not there.
    pub async fn lookup(
        &self,
        session_id: Uuid,
        actor: &Actor,
        appointment_id: &str,
    ) -> Result<Appointment, WorkflowError> {
        if let Some(found) = self
            .board(session_id)
            .await
            .and_then(|b| b.into_iter().find(|a| a.id == appointment_id))
        {
            return Ok(found);
        }

        self.refresh(session_id, actor)
            .await?
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| WorkflowError::NotFound(appointment_id.to_string()))
    }

    /// Resolve what moving to `target` would dispatch, without dispatching it.
    pub async fn preview_transition(
        &self,
        session_id: Uuid,
        actor: &Actor,
        appointment_id: &str,
        target: AppointmentStatus,
    ) -> Result<AppointmentAction, WorkflowError> {
        let appointment = self.lookup(session_id, actor, appointment_id).await?;
        Ok(lifecycle::authorize(actor, &appointment, target)?)
    }

    /// Authorizes against a fresh fetch, never the session's board.
    pub async fn request_transition(
        &self,
        session_id: Uuid,
        actor: &Actor,
        appointment_id: &str,
        target: AppointmentStatus,
    ) -> Result<(), WorkflowError> {
        let appointment = self
            .refresh(session_id, actor)
            .await?
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| WorkflowError::NotFound(appointment_id.to_string()))?;
        let action = lifecycle::authorize(actor, &appointment, target)?;

        match action {
            AppointmentAction::Withdraw => self.backend.delete_appointment(appointment_id).await?,
            _ => {
                self.backend
                    .update_appointment_status(appointment_id, action.target())
                    .await?
            }
        }
        info!(
            %appointment_id, %action, role = %actor.role,
            "appointment {} -> {}", appointment.status, action.target()
        );

        match action {
            AppointmentAction::Confirm => {
                self.arm_reminder(&ReminderRequest::from(&appointment)).await;
            }
            AppointmentAction::Cancel | AppointmentAction::Withdraw => {
                if let Err(e) = self.reminders.cancel(appointment_id).await {
                    warn!(%appointment_id, "failed to cancel reminder: {e}");
                }
            }
            AppointmentAction::Complete => {}
        }

        self.refresh_after_mutation(session_id, actor).await;
        Ok(())
    }

    /// Book on behalf of `actor`; guests are filed under the shared guest id.
    pub async fn book(
        &self,
        session_id: Uuid,
        actor: &Actor,
        req: BookingRequest,
    ) -> Result<Appointment, WorkflowError> {
        let time = req.time.trim();
        if time.is_empty() {
            return Err(WorkflowError::Validation("appointment time is required".into()));
        }
        if req.doctor_id.trim().is_empty() {
            return Err(WorkflowError::Validation("doctor is required".into()));
        }

        let new = NewAppointment {
            patient_id: actor.patient_id().to_string(),
            patient_name: actor.name.clone(),
            patient_email: actor.email.clone(),
            patient_phone: actor.phone.clone().unwrap_or_default(),
            doctor_id: req.doctor_id.trim().to_string(),
            doctor_name: req.doctor_name.trim().to_string(),
            date: req.date,
            time: time.to_string(),
            notes: req.notes.filter(|n| !n.trim().is_empty()),
        };

        let created = self.backend.create_appointment(&new).await?;
        info!(appointment_id = %created.id, doctor_id = %created.doctor_id, date = %created.date, "appointment booked");

        self.arm_reminder(&ReminderRequest::from(&created)).await;
        self.refresh_after_mutation(session_id, actor).await;
        Ok(created)
    }

    async fn arm_reminder(&self, req: &ReminderRequest) {
        if let Err(e) = self.reminders.schedule(req).await {
            warn!(appointment_id = %req.appointment_id, "reminder not scheduled: {e}");
        }
    }

    async fn refresh_after_mutation(&self, session_id: Uuid, actor: &Actor) {
        if let Err(e) = self.refresh(session_id, actor).await {
            warn!(%session_id, "list refresh after mutation failed: {e}");
        }
    }
}
