use crate::devices::hardware::pump::{ActuatorError, Pump};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the dosing automation. Configuration and calibration
/// errors are fatal at construction so the automation never starts, while
/// actuator errors surface unchanged from the pump layer.
#[derive(Debug, Error)]
pub enum DosingError {
    /// A construction parameter or a runtime setting update was malformed
    /// or out of range.
    #[error("invalid configuration for `{parameter}`: {reason}")]
    InvalidConfiguration {
        /// Name of the offending parameter as published.
        parameter: String,
        /// What was wrong with the value.
        reason: String,
    },
    /// A required pump has no entry in the calibration record.
    #[error("{0} pump calibration must be performed first.")]
    CalibrationMissing(Pump),
    /// The pump layer failed to carry out a dilution.
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
    /// The component config file could not be located or parsed.
    #[error("failed to load config file {path:?}: {source}")]
    ConfigFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying config crate error.
        #[source]
        source: config::ConfigError,
    },
    /// Socket level failure in the runner.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The runner's tick task panicked or was cancelled, no further
    /// dilutions would be made.
    #[error("tick loop stopped: {0}")]
    TickLoopStopped(#[from] tokio::task::JoinError),
}

impl DosingError {
    /// Shorthand for building an `InvalidConfiguration` error.
    pub fn invalid(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// No OD reading could be obtained for a tick. This is recoverable: the
/// tick is skipped and the condition is logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("OD reading is not available on channel {channel}")]
pub struct SensorUnavailable {
    /// The OD channel that was queried.
    pub channel: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_message_names_pump() {
        let err = DosingError::CalibrationMissing(Pump::AltMedia);
        assert_eq!(
            err.to_string(),
            "alt_media pump calibration must be performed first."
        );
    }

    #[test]
    fn test_invalid_configuration_names_parameter() {
        let err = DosingError::invalid("volume", "must be greater than 0");
        assert!(err.to_string().contains("`volume`"));
    }

    #[test]
    fn test_actuator_error_is_transparent() {
        let inner = ActuatorError::Rejected(String::from("pump busy"));
        let expected = inner.to_string();
        let err: DosingError = inner.into();
        assert_eq!(err.to_string(), expected);
    }
}
