//! Appointment status graph and who may walk each edge.
//!
//! Every screen asks this module instead of re-deriving role checks inline:
//! `authorize` guards a mutation, `available_actions` drives which buttons a
//! card shows.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Actor, Appointment, AppointmentStatus, Role};

/// Concrete mutation behind a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentAction {
    Confirm,
    Cancel,
    Complete,
    /// Patient self-cancellation; removes the booking on the backend.
    Withdraw,
}

impl AppointmentAction {
    pub fn target(self) -> AppointmentStatus {
        match self {
            AppointmentAction::Confirm => AppointmentStatus::Confirmed,
            AppointmentAction::Cancel | AppointmentAction::Withdraw => AppointmentStatus::Cancelled,
            AppointmentAction::Complete => AppointmentStatus::Completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Complete => "complete",
            AppointmentAction::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("appointment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("a {role} may not {action} this appointment")]
    NotPermitted { role: Role, action: String },
}

/// Outgoing edges of the status graph.
pub fn valid_targets(from: AppointmentStatus) -> &'static [AppointmentStatus] {
    match from {
        AppointmentStatus::Pending => &[AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
        AppointmentStatus::Confirmed => &[AppointmentStatus::Completed],
        AppointmentStatus::Completed | AppointmentStatus::Cancelled => &[],
    }
}

pub fn is_valid_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    valid_targets(from).contains(&to)
}

/// Validate `actor` moving `appointment` to `target` and resolve the action to dispatch.
///
/// Checks the edge first, then the role, then (for patients) ownership.
pub fn authorize(
    actor: &Actor,
    appointment: &Appointment,
    target: AppointmentStatus,
) -> Result<AppointmentAction, LifecycleError> {
    let from = appointment.status;
    if !is_valid_transition(from, target) {
        warn!(
            appointment_id = %appointment.id,
            %from, to = %target, role = %actor.role,
            "rejected status transition"
        );
        return Err(LifecycleError::InvalidTransition { from, to: target });
    }

    let action = if actor.role.is_staff() {
        staff_action(target).ok_or(LifecycleError::InvalidTransition { from, to: target })?
    } else {
        if target != AppointmentStatus::Cancelled {
            return Err(LifecycleError::NotPermitted {
                role: actor.role,
                action: verb_for(target).to_string(),
            });
        }
        if !actor.owns(appointment) {
            return Err(LifecycleError::NotPermitted {
                role: actor.role,
                action: "cancel".to_string(),
            });
        }
        AppointmentAction::Withdraw
    };

    debug!(appointment_id = %appointment.id, %action, "status transition authorized");
    Ok(action)
}

/// Actions `actor` may take on `appointment` right now.
pub fn available_actions(actor: &Actor, appointment: &Appointment) -> Vec<AppointmentAction> {
    valid_targets(appointment.status)
        .iter()
        .filter_map(|target| authorize_quiet(actor, appointment, *target))
        .collect()
}

fn authorize_quiet(
    actor: &Actor,
    appointment: &Appointment,
    target: AppointmentStatus,
) -> Option<AppointmentAction> {
    if actor.role.is_staff() {
        return staff_action(target);
    }
    (target == AppointmentStatus::Cancelled && actor.owns(appointment))
        .then_some(AppointmentAction::Withdraw)
}

fn staff_action(target: AppointmentStatus) -> Option<AppointmentAction> {
    match target {
        AppointmentStatus::Confirmed => Some(AppointmentAction::Confirm),
        AppointmentStatus::Cancelled => Some(AppointmentAction::Cancel),
        AppointmentStatus::Completed => Some(AppointmentAction::Complete),
        AppointmentStatus::Pending => None,
    }
}

fn verb_for(target: AppointmentStatus) -> &'static str {
    match target {
        AppointmentStatus::Pending => "reopen",
        AppointmentStatus::Confirmed => "confirm",
        AppointmentStatus::Completed => "complete",
        AppointmentStatus::Cancelled => "cancel",
    }
}
