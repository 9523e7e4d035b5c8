//! Operator-driven alert status transitions.

use std::sync::Arc;

use crate::error::StoreError;
use crate::models::alert::{Alert, AlertStatus};
use crate::repositories::AlertStore;
use crate::types::AlertId;
use crate::utils::time::Clock;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("alert not found")]
    NotFound,
    #[error("cannot move alert from {from} to {to}")]
    Invalid { from: AlertStatus, to: AlertStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AlertWorkflow {
    alerts: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
}

impl AlertWorkflow {
    pub fn new(alerts: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self { alerts, clock }
    }

    /// Moves an alert to `next`. Closing as RESOLVED stamps `resolved_at`.
    /// The store update only applies if the alert is still in the status that
    /// was validated, so concurrent operators cannot skip a check.
    pub async fn transition(&self, id: AlertId, next: AlertStatus) -> Result<Alert, TransitionError> {
        let current = self
            .alerts
            .find(id)
            .await?
            .ok_or(TransitionError::NotFound)?;
        if !current.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: current.status,
                to: next,
            });
        }

        let resolved_at = (next == AlertStatus::Resolved).then(|| self.clock.now());
        match self
            .alerts
            .update_status(id, current.status, next, resolved_at)
            .await?
        {
            Some(updated) => {
                tracing::info!(alert_id = %id, from = %current.status, to = %next, "alert status changed");
                Ok(updated)
            }
            // Lost a race with another operator; report against the fresh state.
            None => {
                let latest = self
                    .alerts
                    .find(id)
                    .await?
                    .ok_or(TransitionError::NotFound)?;
                Err(TransitionError::Invalid {
                    from: latest.status,
                    to: next,
                })
            }
        }
    }
}
