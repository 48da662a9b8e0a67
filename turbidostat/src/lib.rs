/**
The turbidostat crate holds the decision logic of a dosing automation for a
bioreactor: keep a culture at a target optical density by diluting it, and
gradually move the inflow from normal media to an alternate (stress) media.
Sensing, pumping and calibration storage sit behind small traits so the host
platform can supply its own, while the crate ships simple implementations
used by the `increase_stress` system binary.
*/

/// Components group devices into a logical unit that performs
/// some function for a reactor, here the dosing automations.
pub mod components;
/// Devices the automations talk to: pumps, OD readers and the
/// calibration record.
pub mod devices;
/// Error types shared across the crate.
pub mod errors;
/// Message structure for communication into and out of the
/// automation, such as OD readings and setting updates.
pub mod messages;
/// Configuration loading and test helpers.
pub mod utils;
