use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OD reading pushed by the acquisition job.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OdReadingMessage {
    /// OD channel the reading was taken on.
    pub channel: String,
    /// OD600 value.
    pub od: f64,
    /// When the sample was taken, if the acquisition job sends it.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
