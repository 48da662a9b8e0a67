/// Components that dose media into a reactor.
pub mod dosing {
    /// The capability every dosing automation offers the host.
    pub mod automation;
    /// Published settings and their coercion rules.
    pub mod settings;
    /// Turbidostat with a stepwise increasing alternate media ratio.
    pub mod turbidostat_increase_stress;
}

/// Helpful prelude when working with components.
pub mod prelude {
    pub use crate::components::dosing::automation::*;
    pub use crate::components::dosing::settings::*;
    pub use crate::components::dosing::turbidostat_increase_stress::*;
    pub use crate::devices::hardware::od_reader::*;
    pub use crate::devices::hardware::pump::*;
    pub use crate::devices::software::calibration::*;
    pub use crate::errors::*;
}
