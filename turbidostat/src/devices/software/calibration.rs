use crate::{
    devices::hardware::pump::Pump,
    errors::DosingError,
    utils::config_file::{load_yaml, ordered_map},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, ffi::OsStr};

/// Answers whether pumps have been calibrated. Queried once, before an
/// automation is allowed to run.
pub trait CalibrationGate {
    /// True when the calibration record holds an entry for `pump`.
    fn is_calibrated(&self, pump: Pump) -> bool;

    /// The subset of `pumps` that are calibrated, in the order given.
    fn calibrated(&self, pumps: &[Pump]) -> Vec<Pump> {
        pumps
            .iter()
            .copied()
            .filter(|pump| self.is_calibrated(*pump))
            .collect()
    }
}

/// Check `pumps` in the order given and fail on the first one that has
/// no calibration, so the error always names the same pump for the same
/// record.
///
/// * `gate`: calibration record.
/// * `pumps`: pumps that must be calibrated.
pub fn require_calibrated<G>(gate: &G, pumps: &[Pump]) -> Result<(), DosingError>
where
    G: CalibrationGate + ?Sized,
{
    match pumps.iter().find(|pump| !gate.is_calibrated(**pump)) {
        Some(pump) => Err(DosingError::CalibrationMissing(*pump)),
        None => Ok(()),
    }
}

/// Linear pump calibration: `ml = duration * seconds + bias`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct PumpCalibration {
    /// mL dispensed per second of pump run time.
    pub duration: f64,
    /// Offset in mL.
    pub bias: f64,
    /// When the calibration was performed.
    pub timestamp: DateTime<Utc>,
}

/// Current pump calibrations for a reactor, persisted as YAML.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct PumpCalibrationCache {
    /// Calibrations keyed by pump name.
    #[serde(serialize_with = "ordered_map", default)]
    pumps: HashMap<String, PumpCalibration>,
}

impl PumpCalibrationCache {
    /// Create an empty record, no pump is calibrated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the calibration for a pump.
    ///
    /// * `pump`: the calibrated pump.
    /// * `calibration`: fitted calibration.
    pub fn with_calibration(mut self, pump: Pump, calibration: PumpCalibration) -> Self {
        self.pumps.insert(pump.to_string(), calibration);
        self
    }

    /// Calibration for a pump, if one has been performed.
    pub fn get(&self, pump: Pump) -> Option<&PumpCalibration> {
        self.pumps.get(<&'static str>::from(pump))
    }

    /// Read the calibration record from a YAML file.
    ///
    /// * `filepath`: path to the calibration record.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, DosingError> {
        load_yaml(filepath, None)
    }
}

impl CalibrationGate for PumpCalibrationCache {
    fn is_calibrated(&self, pump: Pump) -> bool {
        self.get(pump).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serial_test::serial;
    use std::{fs::File, path::Path};

    fn calibration() -> PumpCalibration {
        PumpCalibration {
            duration: 0.55,
            bias: 0.02,
            timestamp: "2024-03-01T12:00:00Z".parse().expect("Bad timestamp"),
        }
    }

    fn cache_with(pumps: &[Pump]) -> PumpCalibrationCache {
        pumps.iter().fold(PumpCalibrationCache::new(), |cache, pump| {
            cache.with_calibration(*pump, calibration())
        })
    }

    #[rstest]
    #[case(&[Pump::Media, Pump::Waste, Pump::AltMedia], None)]
    #[case(&[Pump::Waste, Pump::AltMedia], Some(Pump::Media))]
    #[case(&[Pump::Media], Some(Pump::Waste))]
    #[case(&[Pump::Media, Pump::Waste], Some(Pump::AltMedia))]
    #[case(&[], Some(Pump::Media))]
    fn test_first_missing_pump_is_reported(
        #[case] calibrated: &[Pump],
        #[case] missing: Option<Pump>,
    ) {
        let cache = cache_with(calibrated);
        let result = require_calibrated(&cache, &Pump::REQUIRED);
        match missing {
            None => assert!(result.is_ok()),
            Some(expected) => assert!(
                matches!(result, Err(DosingError::CalibrationMissing(pump)) if pump == expected),
                "Expected {expected} to be reported"
            ),
        }
    }

    #[test]
    fn test_calibrated_subset_keeps_order() {
        let cache = cache_with(&[Pump::AltMedia, Pump::Media]);
        assert_eq!(
            cache.calibrated(&Pump::REQUIRED),
            vec![Pump::Media, Pump::AltMedia]
        );
    }

    #[test]
    #[serial]
    fn test_read_write_calibration_cache_to_file() {
        let write_cache = cache_with(&Pump::REQUIRED);
        let dir = format!("{}/test-outputs/devices/software", env!("CARGO_MANIFEST_DIR"));
        std::fs::create_dir_all(&dir).expect("Failed to create dir");
        let path = format!("{dir}/pump_calibration.yaml");

        let file = File::create(Path::new(&path)).expect("Failed to open file");
        serde_yaml::to_writer(file, &write_cache).expect("Failed to write yaml");

        let read_cache = PumpCalibrationCache::from_file(&path).expect("Failed to read cache");
        assert_eq!(write_cache, read_cache, "Failed to read write calibration cache");
    }

    #[test]
    fn test_read_shipped_calibration_file() {
        let file = crate::test_file_path!("/config/devices/pump_calibration.yaml");
        let cache = PumpCalibrationCache::from_file(file).expect("Failed to read cache");
        assert!(require_calibrated(&cache, &Pump::REQUIRED).is_ok());
    }
}
