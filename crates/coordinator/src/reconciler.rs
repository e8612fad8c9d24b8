//! Target state reconciliation
//!
//! [`TargetStateController`] owns the desired state and turns heartbeats and
//! operator updates into dispatcher commands. [`Reconciler`] executes those
//! commands: compare, and PATCH only an idle device that has drifted.

use std::sync::Arc;

use contracts::{
    Command, CommandHandler, ContractError, DeviceId, DevicePayload, FieldDrift, TargetState,
    TargetStatePatch,
};
use device_client::DeviceClient;
use dispatcher::DispatcherHandle;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

/// What one reconciliation did
#[derive(Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// Device already at target; no call made
    InSync,
    /// Device drifted but is busy; retried on a later heartbeat
    Deferred { drift: Vec<FieldDrift> },
    /// PATCH sent; the device answered with `status`
    Patched { status: u16 },
    /// PATCH could not be delivered
    Unreachable { message: String },
}

/// Command handler pushing the target state to devices
pub struct Reconciler<C> {
    client: Arc<C>,
}

impl<C: DeviceClient> Reconciler<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Compare `payload` against `target` and correct the device if possible
    #[instrument(name = "reconcile", skip(self, target, device, payload), fields(device = %device, status = %payload.status))]
    pub async fn reconcile(
        &self,
        target: &TargetState,
        device: &DeviceId,
        payload: &DevicePayload,
    ) -> ReconcileOutcome {
        let drift = target.drift_from(payload);
        if drift.is_empty() {
            debug!("Device at target state");
            return ReconcileOutcome::InSync;
        }

        for d in &drift {
            info!(
                field = d.field,
                reported = %d.reported,
                desired = %d.desired,
                "Device differs from target state"
            );
        }

        if !payload.is_idle() {
            info!("Device not idle, leaving target state unresolved");
            return ReconcileOutcome::Deferred { drift };
        }

        match self
            .client
            .apply_target_state(&payload.service_url, target)
            .await
        {
            Ok(status) => {
                let success = (200..300).contains(&status);
                observability::record_target_state_patch(device, success);
                if success {
                    info!(status, "Target state pushed");
                } else {
                    warn!(status, "Device rejected target state");
                }
                ReconcileOutcome::Patched { status }
            }
            Err(e) => {
                observability::record_target_state_patch(device, false);
                warn!(error = %e, "Failed to push target state");
                ReconcileOutcome::Unreachable {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl<C: DeviceClient + 'static> CommandHandler for Reconciler<C> {
    async fn handle(&self, command: Command) -> Result<(), ContractError> {
        match command {
            Command::ReachTargetState {
                target,
                device,
                payload,
            } => {
                // Transport failures are not retried here; the next heartbeat is the retry.
                self.reconcile(&target, &device, &payload).await;
                Ok(())
            }
        }
    }
}

/// Owner of the desired target state
pub struct TargetStateController {
    state: RwLock<TargetState>,
    dispatcher: DispatcherHandle,
}

impl TargetStateController {
    pub fn new(initial: TargetState, dispatcher: DispatcherHandle) -> Self {
        Self {
            state: RwLock::new(initial),
            dispatcher,
        }
    }

    /// Current desired state
    pub fn state(&self) -> TargetState {
        *self.state.read()
    }

    /// Queue a reconciliation of one device against the current state
    pub fn reconcile(&self, device: &DeviceId, payload: &DevicePayload) -> bool {
        self.dispatcher.offer(Command::ReachTargetState {
            target: self.state(),
            device: device.clone(),
            payload: payload.clone(),
        })
    }

    /// Merge `patch` into the desired state and reconcile every given device
    #[instrument(name = "update_target_state", skip(self, patch, devices))]
    pub fn update<I>(&self, patch: &TargetStatePatch, devices: I) -> TargetState
    where
        I: IntoIterator<Item = (DeviceId, DevicePayload)>,
    {
        let updated = {
            let mut state = self.state.write();
            *state = state.merge(patch);
            *state
        };
        info!(target_state = ?updated, "Target state updated");

        let mut offered = 0usize;
        for (device, payload) in devices {
            if self.dispatcher.offer(Command::ReachTargetState {
                target: updated,
                device,
                payload,
            }) {
                offered += 1;
            }
        }
        debug!(devices = offered, "Reconciliation queued");
        updated
    }
}
