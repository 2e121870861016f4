//! Mapping from boxed device errors to typed `ControlError`s.

use crate::error::ControlError;

/// Map any device error to a typed ControlError, with precise handling for
/// `seeker_hardware::HwError` when the `hardware-errors` feature is on.
#[cfg(feature = "hardware-errors")]
pub(crate) fn map_device_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    use seeker_hardware::error::HwError;
    if let Some(hw) = e.downcast_ref::<HwError>() {
        match hw {
            HwError::Timeout => ControlError::Timeout,
            other => ControlError::HardwareFault(other.to_string()),
        }
    } else {
        map_by_message(e)
    }
}

#[cfg(not(feature = "hardware-errors"))]
pub(crate) fn map_device_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    map_by_message(e)
}

fn map_by_message(e: &(dyn std::error::Error + 'static)) -> ControlError {
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ControlError::Timeout
    } else {
        ControlError::Hardware(s)
    }
}
