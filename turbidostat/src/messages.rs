/// Standardise how messages are sent into and out of
/// the automation. Provide test suite to ensure
/// interfaces are respected.
pub mod control {
    /// Envelope for every message accepted on the control port.
    pub mod control_message;
    /// Dilutions as sent to the pump service.
    pub mod dosing_event;
    /// OD readings come from the acquisition job.
    pub mod od_reading;
    /// Setting updates come from the host.
    pub mod setting;
}
