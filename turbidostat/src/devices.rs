/// Devices are the atomic units that can be combined together
/// into components. Their core responsibilities do not change
/// based on location, name etc.
pub mod hardware {
    /// Device interface for the media, alternate media and waste pumps.
    pub mod pump;
    /// Device interface for the optical density readings.
    pub mod od_reader;
}

/// Devices without hardware of their own.
pub mod software {
    /// Pump calibration record checked before an automation starts.
    pub mod calibration;
}
