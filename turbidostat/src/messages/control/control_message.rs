use crate::messages::control::{od_reading::OdReadingMessage, setting::SettingMessage};
use serde::{Deserialize, Serialize};

/// Newline delimited JSON message accepted on the control port,
/// discriminated by its `type` field.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Latest OD sample from the acquisition job.
    OdReading(OdReadingMessage),
    /// Setting update from the host.
    Setting(SettingMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case((
        r#"{"type": "od_reading", "channel": "2", "od": 2.5}"#,
        ControlMessage::OdReading(OdReadingMessage {
            channel: String::from("2"),
            od: 2.5,
            timestamp: None,
        })))]
    #[case((
        r#"{"type": "setting", "name": "alt_media_ratio_increase", "value": 0.1}"#,
        ControlMessage::Setting(SettingMessage {
            name: String::from("alt_media_ratio_increase"),
            value: serde_json::json!(0.1),
        })))]
    fn test_parse_and_compare_control_message(#[case] args: (&str, ControlMessage)) {
        let parsed: ControlMessage = serde_json::from_str(args.0).unwrap();

        assert_eq!(parsed, args.1, "Failed to parse message correctly");
    }

    #[rstest]
    #[case(r#"{"type": "pump", "media_ml": 1.0}"#)]
    #[case(r#"{"channel": "2", "od": 2.5}"#)]
    #[case(r#"{"type": "od_reading", "channel": "2"}"#)]
    fn test_reject_unknown_or_incomplete_message(#[case] raw: &str) {
        assert!(serde_json::from_str::<ControlMessage>(raw).is_err());
    }
}
