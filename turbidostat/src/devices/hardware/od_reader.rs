use crate::errors::SensorUnavailable;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Source of the latest optical density readings, keyed by channel.
pub trait SensorReader {
    /// Latest OD600 reading on `channel`, or `SensorUnavailable` when the
    /// acquisition job is not running or has not produced a sample yet.
    fn latest_od(&self, channel: &str) -> Result<f64, SensorUnavailable>;
}

/// Shared cache of the most recent OD reading per channel. The acquisition
/// side records readings through a clone of the handle while the controller
/// reads through the `SensorReader` trait.
#[derive(Clone, Default, Debug)]
pub struct LatestOdReadings {
    readings: Arc<Mutex<HashMap<String, f64>>>,
}

impl LatestOdReadings {
    /// Create an empty cache, no channel has a reading yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest reading for a channel, replacing the previous one.
    ///
    /// * `channel`: OD channel identifier, e.g. "2".
    /// * `od`: OD600 value.
    pub fn record(&self, channel: impl Into<String>, od: f64) {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.into(), od);
    }

    /// Forget the reading for a channel, e.g. when the acquisition job stops.
    pub fn clear(&self, channel: &str) {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);
    }
}

impl SensorReader for LatestOdReadings {
    fn latest_od(&self, channel: &str) -> Result<f64, SensorUnavailable> {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .copied()
            .ok_or_else(|| SensorUnavailable {
                channel: channel.to_owned(),
            })
    }
}
