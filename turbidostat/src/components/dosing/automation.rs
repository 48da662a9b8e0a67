use crate::{
    components::dosing::settings::{PublishedSetting, SettingValue},
    devices::{hardware::pump::DilutionRequest, software::calibration::CalibrationGate},
    errors::{DosingError, SensorUnavailable},
};

/// A dosing automation as seen by the host: constructed once behind the
/// calibration gate, then ticked on the host's schedule. Settings are
/// read and written between ticks through the same exclusive borrow, so
/// a tick never observes a half applied update.
pub trait DosingAutomation: Sized {
    /// Name the host registers the automation under.
    const AUTOMATION_NAME: &'static str;

    /// Everything needed to build the automation.
    type Config;

    /// Build the automation, failing before any tick if the configuration
    /// is invalid or a required pump is not calibrated.
    ///
    /// * `config`: construction inputs.
    /// * `gate`: pump calibration record.
    fn construct(config: Self::Config, gate: &dyn CalibrationGate) -> Result<Self, DosingError>;

    /// Run one decision. At most one dilution is issued per tick.
    fn tick(&mut self) -> Result<TickOutcome, DosingError>;

    /// Apply a setting update from the host. Takes effect on the next tick.
    ///
    /// * `name`: published setting name.
    /// * `raw`: value to coerce to the setting's datatype.
    fn apply_setting(&mut self, name: &str, raw: &str) -> Result<SettingValue, DosingError>;

    /// Current value of every published setting.
    fn published_settings(&self) -> Vec<PublishedSetting>;
}

/// Alternate media ratio before and after a step up.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RatioStep {
    /// Ratio used for the dilutions of the finished step.
    pub previous: f64,
    /// Ratio used from the next dilution onwards.
    pub current: f64,
}

/// What a single tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// No OD reading was available, nothing changed.
    Skipped(SensorUnavailable),
    /// The reading did not exceed the target, nothing changed.
    BelowTarget {
        /// Reading that was compared against the target.
        latest_od: f64,
    },
    /// A dilution was issued.
    Diluted {
        /// Reading that triggered the dilution.
        latest_od: f64,
        /// Volumes sent to the actuator.
        request: DilutionRequest,
        /// Set when this dilution completed a step.
        ratio_step: Option<RatioStep>,
    },
}

impl TickOutcome {
    /// The dilution issued during the tick, if any.
    pub fn dilution(&self) -> Option<&DilutionRequest> {
        match self {
            TickOutcome::Diluted { request, .. } => Some(request),
            TickOutcome::Skipped(_) | TickOutcome::BelowTarget { .. } => None,
        }
    }

    /// The ratio step taken during the tick, if any.
    pub fn ratio_step(&self) -> Option<RatioStep> {
        match self {
            TickOutcome::Diluted { ratio_step, .. } => *ratio_step,
            TickOutcome::Skipped(_) | TickOutcome::BelowTarget { .. } => None,
        }
    }
}
