//! DeviceListener port - Callback invoked with device state updates.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::zigbee::{DeviceName, DeviceState};

/// Receiver of state updates for the devices it is registered for.
///
/// Registrations are tracked by identity (the `Arc` pointer), so the same
/// instance that was registered must be handed back to unregister.
///
/// Implementations should be:
/// - **Quick** - updates for a device are delivered one after another
/// - **Isolated** - an error is logged by the caller and never reaches
///   other listeners
#[async_trait]
pub trait DeviceListener: Send + Sync {
    /// Handle a new state for `device`.
    async fn on_state(&self, device: DeviceName, state: DeviceState) -> Result<(), DomainError>;

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}
