//! Dispatcher commands
//!
//! Side-effecting work that request paths hand off to the dispatcher's worker
//! pool instead of doing inline.

use crate::{ContractError, DeviceId, DevicePayload, TargetState};

/// Work item for the dispatcher
#[derive(Debug, Clone)]
pub enum Command {
    /// Bring one device to the target state
    ReachTargetState {
        target: TargetState,
        device: DeviceId,
        payload: DevicePayload,
    },
}

impl Command {
    /// Short name for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReachTargetState { .. } => "reach_target_state",
        }
    }
}

/// Executes dispatcher commands
#[trait_variant::make(CommandHandler: Send)]
pub trait LocalCommandHandler {
    async fn handle(&self, command: Command) -> Result<(), ContractError>;
}
