/// Reading YAML config files with environment overrides.
pub mod config_file;
/// Compile time checked paths to test fixtures.
pub mod tests;
