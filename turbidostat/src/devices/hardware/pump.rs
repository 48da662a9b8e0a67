use crate::messages::control::dosing_event::DosingEvent;
use serde::{Deserialize, Serialize};
use std::io::Write;
use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Pumps attached to a reactor. The names match the keys used in the
/// pump calibration record.
#[derive(
    EnumString,
    Display,
    IntoStaticStr,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Pump {
    /// Normal media inflow.
    Media,
    /// Culture outflow.
    Waste,
    /// Alternate (stress) media inflow.
    AltMedia,
}

impl Pump {
    /// Pumps that must be calibrated before a dilution can be trusted,
    /// in the order they are checked.
    pub const REQUIRED: [Pump; 3] = [Pump::Media, Pump::Waste, Pump::AltMedia];
}

/// One dilution: volumes in mL for each pump. Performed as a single
/// action from the point of view of the controller.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct DilutionRequest {
    /// Normal media to add.
    pub media_ml: f64,
    /// Alternate media to add.
    pub alt_media_ml: f64,
    /// Culture to remove.
    pub waste_ml: f64,
}

impl DilutionRequest {
    /// Split `volume` between the two media sources by `alt_media_ratio`
    /// and remove the same volume as waste.
    ///
    /// * `volume`: mL exchanged in one dilution.
    /// * `alt_media_ratio`: fraction of the inflow taken from alternate media.
    pub fn split(volume: f64, alt_media_ratio: f64) -> Self {
        let alt_media_ml = volume * alt_media_ratio;
        Self {
            media_ml: volume - alt_media_ml,
            alt_media_ml,
            waste_ml: volume,
        }
    }
}

/// Failure reported by the pump layer.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The pump service stream could not be written.
    #[error("failed to reach pump service: {0}")]
    Io(#[from] std::io::Error),
    /// The request could not be encoded for the pump service.
    #[error("failed to encode dilution request: {0}")]
    Serialise(#[from] serde_json::Error),
    /// The pump layer refused the request.
    #[error("pump rejected dilution: {0}")]
    Rejected(String),
}

/// Anything that can carry out a dilution. Retries and timeouts belong
/// to the implementor.
pub trait Actuator {
    /// Dispense media, alternate media and waste in one action.
    ///
    /// * `request`: volumes for each pump.
    fn execute_io_action(&mut self, request: &DilutionRequest) -> Result<(), ActuatorError>;
}

/// Actuator that forwards each dilution as a newline delimited JSON
/// `DosingEvent` to a pump service, e.g. over a TCP stream or stdout.
pub struct JsonLineActuator<W: Write> {
    /// Where events are written.
    writer: W,
    /// Reactor name stamped on each event.
    unit: String,
    /// Experiment name stamped on each event.
    experiment: String,
}

impl<W: Write> JsonLineActuator<W> {
    /// Create a new actuator over a writer.
    ///
    /// * `writer`: pump service stream.
    /// * `unit`: reactor name.
    /// * `experiment`: experiment name.
    pub fn new(writer: W, unit: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            writer,
            unit: unit.into(),
            experiment: experiment.into(),
        }
    }

    /// Consume the actuator and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Actuator for JsonLineActuator<W> {
    fn execute_io_action(&mut self, request: &DilutionRequest) -> Result<(), ActuatorError> {
        let event = DosingEvent::new(&self.unit, &self.experiment, *request);
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("media", Pump::Media)]
    #[case("waste", Pump::Waste)]
    #[case("alt_media", Pump::AltMedia)]
    fn test_pump_names_match_calibration_keys(#[case] name: &str, #[case] pump: Pump) {
        assert_eq!(Pump::from_str(name).expect("Unknown pump"), pump);
        assert_eq!(pump.to_string(), name);
        let as_str: &'static str = pump.into();
        assert_eq!(as_str, name);
    }

    #[rstest]
    #[case(1.0, 0.0, 1.0, 0.0)]
    #[case(1.0, 0.25, 0.75, 0.25)]
    #[case(2.5, 1.0, 0.0, 2.5)]
    fn test_split_keeps_inflow_equal_to_waste(
        #[case] volume: f64,
        #[case] ratio: f64,
        #[case] media_ml: f64,
        #[case] alt_media_ml: f64,
    ) {
        let request = DilutionRequest::split(volume, ratio);
        assert!((request.media_ml - media_ml).abs() < 1e-12);
        assert!((request.alt_media_ml - alt_media_ml).abs() < 1e-12);
        assert!((request.media_ml + request.alt_media_ml - volume).abs() < 1e-12);
        assert_eq!(request.waste_ml, volume);
    }

    #[test]
    fn test_json_line_actuator_writes_one_event_per_dilution() {
        let mut actuator = JsonLineActuator::new(Vec::new(), "reactor1", "stress_test");
        actuator
            .execute_io_action(&DilutionRequest::split(1.0, 0.1))
            .expect("Failed to write");
        actuator
            .execute_io_action(&DilutionRequest::split(1.0, 0.2))
            .expect("Failed to write");

        let written = String::from_utf8(actuator.into_inner()).expect("Not utf8");
        let events: Vec<DosingEvent> = written
            .lines()
            .map(|line| serde_json::from_str(line).expect("Failed to parse event"))
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].unit, "reactor1");
        assert_eq!(events[1].experiment, "stress_test");
        assert!((events[1].request.alt_media_ml - 0.2).abs() < 1e-12);
    }

    /// Writer that refuses every write.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_line_actuator_reports_stream_failure() {
        let mut actuator = JsonLineActuator::new(BrokenPipe, "reactor1", "stress_test");
        let result = actuator.execute_io_action(&DilutionRequest::split(1.0, 0.0));
        assert!(result.is_err(), "Broken stream should fail the dilution");
    }
}
