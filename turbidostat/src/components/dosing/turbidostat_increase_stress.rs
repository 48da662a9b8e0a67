use crate::{
    components::dosing::{
        automation::{DosingAutomation, RatioStep, TickOutcome},
        settings::{PublishedSetting, Setting, SettingValue},
    },
    devices::{
        hardware::{
            od_reader::{LatestOdReadings, SensorReader},
            pump::{Actuator, DilutionRequest, Pump},
        },
        software::calibration::{require_calibrated, CalibrationGate, PumpCalibrationCache},
    },
    errors::DosingError,
    messages::control::control_message::ControlMessage,
    utils::config_file::load_yaml,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use strum::IntoEnumIterator;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    net::TcpListener,
    sync::Mutex,
    task::{self, JoinError},
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Name the automation is registered under by the host.
pub const AUTOMATION_NAME: &str = "turbidostat_increase_stress";
/// Human readable plugin name.
pub const PLUGIN_NAME: &str = "Turbidostat Increase Stress";
/// One line plugin summary.
pub const PLUGIN_SUMMARY: &str =
    "Dosing automation for maintaining target OD with increasing alternate media ratio";
/// Plugin version.
pub const PLUGIN_VERSION: &str = "0.0.1";
/// OD channel read when none is configured.
pub const DEFAULT_OD_CHANNEL: &str = "2";
/// Environment prefix for overriding values in the component config file.
pub const ENV_PREFIX: &str = "TURBIDOSTAT";

/// The five user supplied parameters of the automation.
#[derive(Deserialize, Serialize, Copy, Clone, Debug, PartialEq)]
pub struct DosingParameters {
    /// OD600 above which a dilution is triggered.
    pub target_od: f64,
    /// mL pumped in and pumped out per dilution. This is not the culture volume.
    pub volume: f64,
    /// Dilutions performed before the alternate media ratio is increased.
    pub dilutions: u32,
    /// Alternate media fraction to start with, e.g. 0.05 for 5% alternate
    /// and 95% normal media.
    pub initial_alt_media: f64,
    /// Amount added to the alternate media fraction after each step.
    pub alt_media_ratio_increase: f64,
}

impl Default for DosingParameters {
    fn default() -> Self {
        Self {
            target_od: 2.0,
            volume: 1.0,
            dilutions: 10,
            initial_alt_media: 0.0,
            alt_media_ratio_increase: 0.05,
        }
    }
}

impl DosingParameters {
    /// Settings that make up the construction parameters.
    const CONSTRUCTION_SETTINGS: [Setting; 5] = [
        Setting::TargetOd,
        Setting::Volume,
        Setting::Dilutions,
        Setting::InitialAltMedia,
        Setting::AltMediaRatioIncrease,
    ];

    /// Build parameters from raw key value pairs as handed over by a host,
    /// coercing each value to the setting's datatype.
    ///
    /// * `pairs`: `(name, value)` pairs, every construction parameter once.
    pub fn from_raw(pairs: &[(&str, &str)]) -> Result<Self, DosingError> {
        let mut values: HashMap<Setting, SettingValue> = HashMap::new();
        for (name, raw) in pairs {
            let setting = Setting::from_name(name)?;
            if !Self::CONSTRUCTION_SETTINGS.contains(&setting) {
                return Err(DosingError::invalid(*name, "not a construction parameter"));
            }
            values.insert(setting, setting.parse(raw)?);
        }

        let mut parameters = Self::default();
        for setting in Self::CONSTRUCTION_SETTINGS {
            let value = values
                .get(&setting)
                .copied()
                .ok_or_else(|| DosingError::invalid(setting.to_string(), "missing"))?;
            parameters.set(setting, value);
        }
        Ok(parameters)
    }

    /// Check every parameter is within range.
    pub fn validate(&self) -> Result<(), DosingError> {
        Self::CONSTRUCTION_SETTINGS
            .into_iter()
            .try_for_each(|setting| setting.check(self.value(setting)))
    }

    /// Typed value of a construction parameter.
    fn value(&self, setting: Setting) -> SettingValue {
        match setting {
            Setting::TargetOd => SettingValue::Float(self.target_od),
            Setting::Volume => SettingValue::Float(self.volume),
            Setting::Dilutions => SettingValue::Integer(self.dilutions),
            // Parameters alone only know the ratio a run starts with.
            Setting::InitialAltMedia | Setting::AltMediaRatio => {
                SettingValue::Float(self.initial_alt_media)
            }
            Setting::AltMediaRatioIncrease => SettingValue::Float(self.alt_media_ratio_increase),
        }
    }

    /// Store an already checked value. `AltMediaRatio` is live state and
    /// not a parameter, callers route it elsewhere.
    fn set(&mut self, setting: Setting, value: SettingValue) {
        match (setting, value) {
            (Setting::Dilutions, SettingValue::Integer(dilutions)) => self.dilutions = dilutions,
            (Setting::TargetOd, SettingValue::Float(value)) => self.target_od = value,
            (Setting::Volume, SettingValue::Float(value)) => self.volume = value,
            (Setting::InitialAltMedia, SettingValue::Float(value)) => {
                self.initial_alt_media = value;
            }
            (Setting::AltMediaRatioIncrease, SettingValue::Float(value)) => {
                self.alt_media_ratio_increase = value;
            }
            _ => {}
        }
    }
}

/// Snapshot of the controller's configuration and run state.
#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct ControllerState {
    /// OD600 above which a dilution is triggered.
    pub target_od: f64,
    /// mL exchanged per dilution.
    pub volume: f64,
    /// Dilutions per ratio step.
    pub dilutions_per_step: u32,
    /// Live alternate media fraction, always within [0, 1].
    pub alt_media_ratio: f64,
    /// Increase applied at the end of each step.
    pub ratio_increase: f64,
    /// Dilutions performed in the current step, always below
    /// `dilutions_per_step` between ticks.
    pub dilution_count: u32,
}

/// Construction inputs for `TurbidostatIncreaseStress`.
pub struct AutomationInputs<S, A> {
    /// User parameters.
    pub parameters: DosingParameters,
    /// OD channel to read on every tick.
    pub od_channel: String,
    /// Source of OD readings.
    pub sensor: S,
    /// Pumps used for dilutions.
    pub actuator: A,
}

impl<S, A> AutomationInputs<S, A> {
    /// Inputs reading the default OD channel.
    pub fn new(parameters: DosingParameters, sensor: S, actuator: A) -> Self {
        Self {
            parameters,
            od_channel: String::from(DEFAULT_OD_CHANNEL),
            sensor,
            actuator,
        }
    }

    /// Read OD from a different channel.
    pub fn with_od_channel(mut self, od_channel: impl Into<String>) -> Self {
        self.od_channel = od_channel.into();
        self
    }
}

/// Turbidostat that dilutes whenever OD exceeds the target and, every
/// `dilutions` dilutions, raises the share of alternate media in the
/// inflow until the culture is fed alternate media only.
pub struct TurbidostatIncreaseStress<S, A> {
    /// Unique id of the automation instance, used in logs.
    uuid: Uuid,
    /// User parameters, live updated through settings.
    parameters: DosingParameters,
    /// OD channel read on every tick.
    od_channel: String,
    /// Live alternate media fraction.
    alt_media_ratio: f64,
    /// Dilutions performed in the current step.
    dilution_count: u32,
    /// Source of OD readings.
    sensor: S,
    /// Pumps used for dilutions.
    actuator: A,
}

impl<S, A> TurbidostatIncreaseStress<S, A>
where
    S: SensorReader,
    A: Actuator,
{
    /// Create the automation. Parameters are range checked, then the
    /// media, waste and alternate media pumps are checked for calibration
    /// in that order.
    ///
    /// * `inputs`: parameters, OD channel, sensor and actuator.
    /// * `gate`: pump calibration record.
    pub fn new<G>(inputs: AutomationInputs<S, A>, gate: &G) -> Result<Self, DosingError>
    where
        G: CalibrationGate + ?Sized,
    {
        inputs.parameters.validate()?;
        require_calibrated(gate, &Pump::REQUIRED)?;

        let automation = Self {
            uuid: Uuid::new_v4(),
            alt_media_ratio: inputs.parameters.initial_alt_media,
            parameters: inputs.parameters,
            od_channel: inputs.od_channel,
            dilution_count: 0,
            sensor: inputs.sensor,
            actuator: inputs.actuator,
        };
        info!(
            automation = %automation.uuid,
            name = AUTOMATION_NAME,
            target_od = automation.parameters.target_od,
            volume = automation.parameters.volume,
            dilutions = automation.parameters.dilutions,
            alt_media_ratio = automation.alt_media_ratio,
            alt_media_ratio_increase = automation.parameters.alt_media_ratio_increase,
            "Automation ready"
        );
        Ok(automation)
    }

    /// Create the automation from a component config, loading the pump
    /// calibration record the config points to.
    ///
    /// * `config`: component config.
    /// * `sensor`: source of OD readings.
    /// * `actuator`: pumps used for dilutions.
    pub fn from_config(
        config: &TurbidostatIncreaseStressConfig,
        sensor: S,
        actuator: A,
    ) -> Result<Self, DosingError> {
        let calibration = config.load_calibration()?;
        let inputs = AutomationInputs::new(config.parameters, sensor, actuator)
            .with_od_channel(config.od_channel.clone());
        Self::new(inputs, &calibration)
    }

    /// Read the OD, dilute when it is strictly above target and step the
    /// alternate media ratio up once enough dilutions have been made.
    /// Actuator failures are returned as is; the dilution count has
    /// already been advanced at that point.
    pub fn decide_and_act(&mut self) -> Result<TickOutcome, DosingError> {
        let latest_od = match self.sensor.latest_od(&self.od_channel) {
            Ok(od) => od,
            Err(unavailable) => {
                warn!(
                    automation = %self.uuid,
                    channel = %unavailable.channel,
                    "OD reading is not available, skipping dilution check"
                );
                return Ok(TickOutcome::Skipped(unavailable));
            }
        };

        if latest_od > self.parameters.target_od {
            self.dilution_count += 1;
            let request = DilutionRequest::split(self.parameters.volume, self.alt_media_ratio);
            info!(
                automation = %self.uuid,
                latest_od,
                media_ml = request.media_ml,
                alt_media_ml = request.alt_media_ml,
                waste_ml = request.waste_ml,
                dilution = self.dilution_count,
                "Diluting"
            );
            self.actuator.execute_io_action(&request)?;

            let ratio_step = if self.dilution_count >= self.parameters.dilutions {
                let step = self.update_media_ratio();
                self.dilution_count = 0;
                Some(step)
            } else {
                None
            };

            Ok(TickOutcome::Diluted {
                latest_od,
                request,
                ratio_step,
            })
        } else {
            debug!(
                automation = %self.uuid,
                latest_od,
                target_od = self.parameters.target_od,
                "OD at or below target"
            );
            Ok(TickOutcome::BelowTarget { latest_od })
        }
    }

    /// Add the increase to the ratio, then clamp to 1.
    fn update_media_ratio(&mut self) -> RatioStep {
        let previous = self.alt_media_ratio;
        self.alt_media_ratio =
            (self.alt_media_ratio + self.parameters.alt_media_ratio_increase).min(1.0);
        info!(
            automation = %self.uuid,
            previous,
            current = self.alt_media_ratio,
            "Alternate media ratio increased"
        );
        RatioStep {
            previous,
            current: self.alt_media_ratio,
        }
    }

    /// Coerce, check and apply a setting to live state. On error nothing
    /// is changed. Lowering `dilutions` to or below the dilutions already
    /// made in the current step leaves one dilution left in the step.
    ///
    /// * `name`: published setting name.
    /// * `raw`: value to coerce.
    pub fn apply_setting(&mut self, name: &str, raw: &str) -> Result<SettingValue, DosingError> {
        let setting = Setting::from_name(name)?;
        let value = setting.parse(raw)?;
        match (setting, value) {
            (Setting::AltMediaRatio, SettingValue::Float(ratio)) => self.alt_media_ratio = ratio,
            (Setting::Dilutions, SettingValue::Integer(dilutions)) => {
                self.parameters.set(setting, value);
                self.dilution_count = self.dilution_count.min(dilutions.saturating_sub(1));
            }
            _ => self.parameters.set(setting, value),
        }
        info!(automation = %self.uuid, setting = name, ?value, "Setting updated");
        Ok(value)
    }

    /// Current value of a published setting.
    ///
    /// * `name`: published setting name.
    pub fn get_setting(&self, name: &str) -> Result<SettingValue, DosingError> {
        Setting::from_name(name).map(|setting| self.setting_value(setting))
    }

    fn setting_value(&self, setting: Setting) -> SettingValue {
        match setting {
            Setting::AltMediaRatio => SettingValue::Float(self.alt_media_ratio),
            other => self.parameters.value(other),
        }
    }

    /// Every published setting with its current value.
    pub fn settings(&self) -> Vec<PublishedSetting> {
        Setting::iter()
            .map(|setting| PublishedSetting {
                descriptor: setting.descriptor(),
                value: self.setting_value(setting),
            })
            .collect()
    }

    /// Snapshot of configuration and run state.
    pub fn state(&self) -> ControllerState {
        ControllerState {
            target_od: self.parameters.target_od,
            volume: self.parameters.volume,
            dilutions_per_step: self.parameters.dilutions,
            alt_media_ratio: self.alt_media_ratio,
            ratio_increase: self.parameters.alt_media_ratio_increase,
            dilution_count: self.dilution_count,
        }
    }

    /// Current parameters.
    pub fn parameters(&self) -> &DosingParameters {
        &self.parameters
    }

    /// Live alternate media fraction.
    pub fn alt_media_ratio(&self) -> f64 {
        self.alt_media_ratio
    }

    /// Dilutions performed in the current step. Not a published setting.
    pub fn dilution_count(&self) -> u32 {
        self.dilution_count
    }

    /// Return the unique identifier of the automation.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// The actuator dilutions are sent to.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Mutable access to the actuator, e.g. to reconnect a pump service.
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }
}

impl<S, A> DosingAutomation for TurbidostatIncreaseStress<S, A>
where
    S: SensorReader,
    A: Actuator,
{
    const AUTOMATION_NAME: &'static str = AUTOMATION_NAME;

    type Config = AutomationInputs<S, A>;

    fn construct(config: Self::Config, gate: &dyn CalibrationGate) -> Result<Self, DosingError> {
        Self::new(config, gate)
    }

    fn tick(&mut self) -> Result<TickOutcome, DosingError> {
        self.decide_and_act()
    }

    fn apply_setting(&mut self, name: &str, raw: &str) -> Result<SettingValue, DosingError> {
        TurbidostatIncreaseStress::apply_setting(self, name, raw)
    }

    fn published_settings(&self) -> Vec<PublishedSetting> {
        self.settings()
    }
}

fn default_od_channel() -> String {
    String::from(DEFAULT_OD_CHANNEL)
}

fn default_duration_minutes() -> f64 {
    1.0
}

/// Configuration for running the automation on one reactor. Read from a
/// YAML file, values can be overridden with `TURBIDOSTAT__...` environment
/// variables (e.g. `TURBIDOSTAT__PARAMETERS__TARGET_OD=1.5`).
#[derive(Deserialize, Serialize, PartialEq, Debug, Clone)]
pub struct TurbidostatIncreaseStressConfig {
    /// Reactor name.
    unit: String,
    /// Experiment name.
    experiment: String,
    /// User parameters.
    pub parameters: DosingParameters,
    /// OD channel read on every tick.
    #[serde(default = "default_od_channel")]
    od_channel: String,
    /// Minutes between ticks.
    #[serde(default = "default_duration_minutes")]
    duration_minutes: f64,
    /// Port the component listens on for OD readings and setting updates.
    port: u16,
    /// Path to the pump calibration record.
    calibration_file: PathBuf,
}

impl TurbidostatIncreaseStressConfig {
    /// Configuration with default parameters, reading the default OD
    /// channel once a minute.
    ///
    /// * `unit`: reactor name.
    /// * `experiment`: experiment name.
    /// * `port`: control port.
    /// * `calibration_file`: path to the pump calibration record.
    pub fn new<F>(unit: String, experiment: String, port: u16, calibration_file: F) -> Self
    where
        F: AsRef<OsStr>,
    {
        Self {
            unit,
            experiment,
            parameters: DosingParameters::default(),
            od_channel: default_od_channel(),
            duration_minutes: default_duration_minutes(),
            port,
            calibration_file: (&calibration_file).into(),
        }
    }

    /// Replace the user parameters.
    pub fn with_parameters(mut self, parameters: DosingParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Read OD from a different channel.
    pub fn with_od_channel(mut self, od_channel: impl Into<String>) -> Self {
        self.od_channel = od_channel.into();
        self
    }

    /// Tick every `duration_minutes` minutes.
    pub fn with_duration_minutes(mut self, duration_minutes: f64) -> Self {
        self.duration_minutes = duration_minutes;
        self
    }

    /// Read and validate the config from a file, applying environment
    /// overrides. A relative `calibration_file` is resolved against the
    /// directory holding the config file.
    ///
    /// * `filepath`: path to config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Result<Self, DosingError> {
        let mut config: Self = load_yaml(&filepath, Some(ENV_PREFIX))?;
        if config.calibration_file.is_relative() {
            if let Some(dir) = Path::new(filepath.as_ref()).parent() {
                config.calibration_file = dir.join(&config.calibration_file);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check parameters and tick period.
    pub fn validate(&self) -> Result<(), DosingError> {
        self.parameters.validate()?;
        self.tick_period().map(|_| ())
    }

    /// Load the pump calibration record.
    pub fn load_calibration(&self) -> Result<PumpCalibrationCache, DosingError> {
        PumpCalibrationCache::from_file(&self.calibration_file)
    }

    /// Time between ticks. Fails unless `duration_minutes` gives a non
    /// zero period that fits in a `Duration`.
    pub fn tick_period(&self) -> Result<Duration, DosingError> {
        Duration::try_from_secs_f64(self.duration_minutes * 60.0)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or_else(|| {
                DosingError::invalid(
                    "duration_minutes",
                    "must be a positive number of minutes of at least a nanosecond",
                )
            })
    }

    /// Reactor name.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Experiment name.
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// OD channel read on every tick.
    pub fn od_channel(&self) -> &str {
        &self.od_channel
    }

    /// Control port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path to the pump calibration record.
    pub fn calibration_file(&self) -> &Path {
        &self.calibration_file
    }
}

/// Unit struct for running a dosing automation on a timer while accepting
/// OD readings and setting updates over a socket.
pub struct TurbidostatIncreaseStressController;

impl TurbidostatIncreaseStressController {
    /// Start the automation. Ticks and setting updates share one lock so a
    /// tick always sees a complete configuration. Failed dilutions are
    /// logged and the next tick runs as scheduled. Returns once the tick
    /// task dies, since the automation would no longer dose.
    ///
    /// * `automation`: constructed automation.
    /// * `readings`: cache the automation reads OD from.
    /// * `config`: component config.
    pub async fn start<T>(
        automation: T,
        readings: LatestOdReadings,
        config: &TurbidostatIncreaseStressConfig,
    ) -> Result<(), DosingError>
    where
        T: DosingAutomation + Send + 'static,
    {
        let period = config.tick_period()?;
        let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
        info!(
            name = T::AUTOMATION_NAME,
            unit = %config.unit,
            experiment = %config.experiment,
            port = config.port,
            period_s = period.as_secs_f64(),
            "Automation started"
        );

        let thread_safe_automation = Arc::new(Mutex::new(automation));
        let mut ticking = tokio::spawn(run_ticks(thread_safe_automation.clone(), period));

        loop {
            tokio::select! {
                stopped = &mut ticking => {
                    let (Ok(e) | Err(e)) = stopped;
                    error!(error = %e, "Tick loop stopped, shutting down");
                    return Err(DosingError::TickLoopStopped(e));
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!(%peer, "Accepted control connection");
                        let connection_automation = thread_safe_automation.clone();
                        let connection_readings = readings.clone();
                        tokio::spawn(async move {
                            handle_connection(
                                BufReader::new(socket),
                                connection_automation,
                                connection_readings,
                            )
                            .await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept control connection"),
                },
            }
        }
    }
}

/// Tick the automation every `period` until a tick panics. Actuators may
/// block on IO, so each tick runs on the blocking pool while holding the
/// automation lock.
///
/// * `automation`: automation shared with the control connections.
/// * `period`: time between ticks.
async fn run_ticks<T>(automation: Arc<Mutex<T>>, period: Duration) -> JoinError
where
    T: DosingAutomation + Send + 'static,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let mut guard = automation.clone().lock_owned().await;
        match task::spawn_blocking(move || guard.tick()).await {
            Ok(Ok(outcome)) => debug!(?outcome, "Tick finished"),
            Ok(Err(e)) => error!(error = %e, "Dilution failed, waiting for the next tick"),
            Err(e) => return e,
        }
    }
}

/// Read newline delimited control messages until the peer closes the
/// connection. Malformed lines are logged and skipped.
///
/// * `reader`: buffered connection.
/// * `automation`: automation receiving setting updates.
/// * `readings`: cache receiving OD readings.
pub async fn handle_connection<R, T>(
    mut reader: R,
    automation: Arc<Mutex<T>>,
    readings: LatestOdReadings,
) where
    R: AsyncBufRead + Unpin,
    T: DosingAutomation,
{
    let mut data = Vec::new();
    loop {
        data.clear();
        match reader.read_until(b'\n', &mut data).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Control connection failed");
                break;
            }
        }
        if data.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<ControlMessage>(&data) {
            Ok(ControlMessage::OdReading(reading)) => {
                debug!(channel = %reading.channel, od = reading.od, "OD reading received");
                readings.record(reading.channel, reading.od);
            }
            Ok(ControlMessage::Setting(setting)) => {
                let raw = setting.raw_value();
                let mut guard = automation.lock().await;
                if let Err(e) = guard.apply_setting(&setting.name, &raw) {
                    warn!(error = %e, "Rejected setting update");
                }
                drop(guard);
            }
            Err(e) => {
                let text = String::from_utf8_lossy(&data);
                warn!(error = %e, data = %text.trim(), "Received a malformed message");
            }
        }
    }
}
