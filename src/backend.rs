//! Client for the remote clinic REST API.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Appointment, AppointmentStatus, BackendUser, ClinicInfo, Doctor, NewAppointment, NewOffer,
    Offer, PushTokenRegistration, RegisterRequest,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("clinic backend unreachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("clinic backend rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("unexpected response from clinic backend: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ClinicBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<BackendUser, BackendError>;
    async fn register(&self, req: &RegisterRequest) -> Result<BackendUser, BackendError>;

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, BackendError>;
    async fn list_appointments(&self) -> Result<Vec<Appointment>, BackendError>;
    async fn list_patient_appointments(&self, patient_id: &str) -> Result<Vec<Appointment>, BackendError>;
    async fn list_doctor_appointments(&self, doctor_id: &str) -> Result<Vec<Appointment>, BackendError>;
    async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<(), BackendError>;
    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), BackendError>;

    async fn list_doctors(&self) -> Result<Vec<Doctor>, BackendError>;
    async fn list_offers(&self) -> Result<Vec<Offer>, BackendError>;
    async fn create_offer(&self, offer: &NewOffer) -> Result<Offer, BackendError>;
    async fn delete_offer(&self, offer_id: &str) -> Result<(), BackendError>;
    async fn clinic_info(&self) -> Result<ClinicInfo, BackendError>;

    async fn register_push_token(&self, reg: &PushTokenRegistration) -> Result<(), BackendError>;
}

pub struct HttpClinicBackend {
    client: Client,
    base_url: String,
}

impl HttpClinicBackend {
    /// `backend_url` is the server root; routes live under `/api`.
    pub fn new(backend_url: &str) -> Result<Self, BackendError> {
        let parsed = reqwest::Url::parse(backend_url)
            .map_err(|e| BackendError::Decode(format!("invalid backend url '{backend_url}': {e}")))?;
        if parsed.scheme() == "http" {
            warn!("clinic backend at '{backend_url}' is not using https");
        }

        Ok(Self {
            client: Client::builder().build()?,
            base_url: format!("{}/api", backend_url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        debug!(path, "GET");
        let resp = self.client.get(self.url(path)).send().await?;
        decode(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        debug!(path, "POST");
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        decode(resp).await
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        debug!(path, "DELETE");
        let resp = self.client.delete(self.url(path)).send().await?;
        decode::<Value>(resp).await.map(|_| ())
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, BackendError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BackendError::Rejected {
            status: status.as_u16(),
            detail: error_detail(status, &body),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// FastAPI puts the reason in `detail` (a string, or a list of validation errors).
fn error_detail(status: StatusCode, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("detail")) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => body.trim().to_string(),
    }
}

#[async_trait]
impl ClinicBackend for HttpClinicBackend {
    async fn login(&self, email: &str, password: &str) -> Result<BackendUser, BackendError> {
        self.post_json("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    async fn register(&self, req: &RegisterRequest) -> Result<BackendUser, BackendError> {
        self.post_json("/auth/register", req).await
    }

    async fn create_appointment(&self, new: &NewAppointment) -> Result<Appointment, BackendError> {
        self.post_json("/appointments", new).await
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, BackendError> {
        self.get_json("/appointments").await
    }

    async fn list_patient_appointments(&self, patient_id: &str) -> Result<Vec<Appointment>, BackendError> {
        self.get_json(&format!("/appointments/patient/{patient_id}")).await
    }

    async fn list_doctor_appointments(&self, doctor_id: &str) -> Result<Vec<Appointment>, BackendError> {
        self.get_json(&format!("/appointments/doctor/{doctor_id}")).await
    }

    async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<(), BackendError> {
        debug!(appointment_id, %status, "PATCH status");
        let resp = self
            .client
            .patch(self.url(&format!("/appointments/{appointment_id}/status")))
            .query(&[("status", status.as_str())])
            .send()
            .await?;
        decode::<Value>(resp).await.map(|_| ())
    }

    async fn delete_appointment(&self, appointment_id: &str) -> Result<(), BackendError> {
        self.delete(&format!("/appointments/{appointment_id}")).await
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, BackendError> {
        self.get_json("/doctors").await
    }

    async fn list_offers(&self) -> Result<Vec<Offer>, BackendError> {
        self.get_json("/offers").await
    }

    async fn create_offer(&self, offer: &NewOffer) -> Result<Offer, BackendError> {
        self.post_json("/offers", offer).await
    }

    async fn delete_offer(&self, offer_id: &str) -> Result<(), BackendError> {
        self.delete(&format!("/offers/{offer_id}")).await
    }

    async fn clinic_info(&self) -> Result<ClinicInfo, BackendError> {
        self.get_json("/clinic-info").await
    }

    async fn register_push_token(&self, reg: &PushTokenRegistration) -> Result<(), BackendError> {
        self.post_json::<_, Value>("/push-tokens", reg).await.map(|_| ())
    }
}
