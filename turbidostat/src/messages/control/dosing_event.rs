use crate::devices::hardware::pump::DilutionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbound record of a dilution sent to the pump service.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DosingEvent {
    /// UTC time the dilution was requested.
    pub timestamp: DateTime<Utc>,
    /// Reactor the dilution is for.
    pub unit: String,
    /// Experiment the dilution belongs to.
    pub experiment: String,
    /// Volumes for each pump.
    pub request: DilutionRequest,
}

impl DosingEvent {
    /// Stamp a dilution request with the current time.
    pub fn new(unit: &str, experiment: &str, request: DilutionRequest) -> Self {
        Self {
            timestamp: Utc::now(),
            unit: unit.to_owned(),
            experiment: experiment.to_owned(),
            request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_compare_dosing_event() {
        let raw = r#"{"timestamp": "2024-03-01T12:00:00Z", "unit": "reactor1",
            "experiment": "stress_test",
            "request": {"media_ml": 0.95, "alt_media_ml": 0.05, "waste_ml": 1.0}}"#;
        let parsed: DosingEvent = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.unit, "reactor1");
        assert_eq!(
            parsed.request,
            DilutionRequest {
                media_ml: 0.95,
                alt_media_ml: 0.05,
                waste_ml: 1.0
            },
            "Failed to parse message correctly"
        );
    }
}
