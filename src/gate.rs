//! Ask-then-act confirmation dialogs.
//!
//! A dialog parks a mutation until its owner confirms it. While the mutation
//! runs the dialog is submitting: a second confirm or a dismiss is refused
//! with `Busy`. Success closes the dialog; failure, or the confirming request
//! being dropped mid-flight, reopens it so the user can retry or dismiss.
//! Idle dialogs older than the gate's TTL are swept when a new one opens.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// How long an unanswered dialog is kept.
pub const DIALOG_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionDescriptor {
    pub title: String,
    pub message: String,
    pub confirm_label: String,
    pub destructive: bool,
}

impl ActionDescriptor {
    pub fn new(title: &str, message: &str, confirm_label: &str, destructive: bool) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            confirm_label: confirm_label.to_string(),
            destructive,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DialogView {
    pub dialog_id: Uuid,
    pub descriptor: ActionDescriptor,
    pub submitting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("confirmation dialog {0} not found")]
    NotFound(Uuid),
    #[error("confirmation dialog {0} is already submitting")]
    Busy(Uuid),
}

struct Dialog<A> {
    owner: Uuid,
    descriptor: ActionDescriptor,
    action: A,
    submitting: bool,
    opened_at: Instant,
}

type Dialogs<A> = Mutex<HashMap<Uuid, Dialog<A>>>;

pub struct ConfirmationGate<A> {
    dialogs: Dialogs<A>,
    ttl: Duration,
}

impl<A> Default for ConfirmationGate<A> {
    fn default() -> Self {
        Self::with_ttl(DIALOG_TTL)
    }
}

/// Settles a submitting dialog however `confirm_then_run` exits, including
/// when its future is dropped before `run` resolves.
struct SubmitGuard<'a, A> {
    dialogs: &'a Dialogs<A>,
    dialog_id: Uuid,
    succeeded: bool,
}

impl<A> Drop for SubmitGuard<'_, A> {
    fn drop(&mut self) {
        let mut dialogs = self.dialogs.lock().unwrap_or_else(|e| e.into_inner());
        if self.succeeded {
            dialogs.remove(&self.dialog_id);
            debug!(dialog_id = %self.dialog_id, "confirmation dialog completed");
        } else if let Some(dialog) = dialogs.get_mut(&self.dialog_id) {
            dialog.submitting = false;
            debug!(dialog_id = %self.dialog_id, "confirmed action did not finish, dialog left open");
        }
    }
}

impl<A> ConfirmationGate<A> {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            dialogs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Dialog<A>>> {
        self.dialogs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<A: Clone + Send> ConfirmationGate<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, owner: Uuid, descriptor: ActionDescriptor, action: A) -> DialogView {
        let dialog_id = Uuid::new_v4();
        let view = DialogView {
            dialog_id,
            descriptor: descriptor.clone(),
            submitting: false,
        };

        let mut dialogs = self.lock();
        let ttl = self.ttl;
        dialogs.retain(|_, d| d.submitting || d.opened_at.elapsed() < ttl);
        dialogs.insert(
            dialog_id,
            Dialog {
                owner,
                descriptor,
                action,
                submitting: false,
                opened_at: Instant::now(),
            },
        );
        debug!(%dialog_id, title = %view.descriptor.title, "confirmation dialog opened");
        view
    }

    pub async fn view(&self, owner: Uuid, dialog_id: Uuid) -> Result<DialogView, GateError> {
        let dialogs = self.lock();
        let dialog = dialogs
            .get(&dialog_id)
            .filter(|d| d.owner == owner)
            .ok_or(GateError::NotFound(dialog_id))?;
        Ok(DialogView {
            dialog_id,
            descriptor: dialog.descriptor.clone(),
            submitting: dialog.submitting,
        })
    }

    /// Run the parked action. `run` is only ever called from here.
    pub async fn confirm_then_run<F, Fut, T, E>(
        &self,
        owner: Uuid,
        dialog_id: Uuid,
        run: F,
    ) -> Result<T, E>
    where
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GateError>,
    {
        let action = {
            let mut dialogs = self.lock();
            let dialog = dialogs
                .get_mut(&dialog_id)
                .filter(|d| d.owner == owner)
                .ok_or(GateError::NotFound(dialog_id))?;
            if dialog.submitting {
                return Err(GateError::Busy(dialog_id).into());
            }
            dialog.submitting = true;
            dialog.action.clone()
        };

        let mut guard = SubmitGuard {
            dialogs: &self.dialogs,
            dialog_id,
            succeeded: false,
        };
        let result = run(action).await;
        guard.succeeded = result.is_ok();
        result
    }

    pub async fn dismiss(&self, owner: Uuid, dialog_id: Uuid) -> Result<(), GateError> {
        let mut dialogs = self.lock();
        match dialogs.get(&dialog_id) {
            Some(d) if d.owner == owner && d.submitting => Err(GateError::Busy(dialog_id)),
            Some(d) if d.owner == owner => {
                dialogs.remove(&dialog_id);
                debug!(%dialog_id, "confirmation dialog dismissed");
                Ok(())
            }
            _ => Err(GateError::NotFound(dialog_id)),
        }
    }

    /// Drop every dialog opened by `owner`. An action already running still
    /// finishes; its dialog is simply gone afterwards.
    pub async fn close_all(&self, owner: Uuid) {
        self.lock().retain(|_, d| d.owner != owner);
    }

    /// Keep only dialogs whose owner session is still live.
    pub async fn retain_owners(&self, live: &HashSet<Uuid>) {
        self.lock().retain(|_, d| live.contains(&d.owner));
    }
}
