//! Turbidostat increase stress binary.
use clap::Parser;
use std::{io::Write, net::TcpStream, process::ExitCode};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use turbidostat::components::prelude::*;

/// Arguments required for starting the program from the command line.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the config file for the Turbidostat Increase Stress Component.
    #[arg(short, long)]
    filepath: String,
    /// Override the target optical density (OD600).
    #[arg(long)]
    target_od: Option<String>,
    /// Override the volume (mL) for each dilution.
    #[arg(long)]
    volume: Option<String>,
    /// Override the number of dilutions per ratio step.
    #[arg(long)]
    dilutions: Option<String>,
    /// Override the initial alternate media ratio.
    #[arg(long)]
    initial_alt_media: Option<String>,
    /// Override the alternate media ratio increase after each step.
    #[arg(long)]
    alt_media_ratio_increase: Option<String>,
    /// Address of the pump service, dilutions go to stdout when absent.
    #[arg(long)]
    pump_address: Option<String>,
    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Overrides given on the command line, as published setting names.
    fn overrides(&self) -> Vec<(&'static str, &str)> {
        [
            ("target_od", &self.target_od),
            ("volume", &self.volume),
            ("dilutions", &self.dilutions),
            ("initial_alt_media", &self.initial_alt_media),
            ("alt_media_ratio_increase", &self.alt_media_ratio_increase),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
        .collect()
    }
}

/// Apply command line overrides on top of the file's parameters.
fn apply_overrides(
    parameters: DosingParameters,
    overrides: &[(&str, &str)],
) -> Result<DosingParameters, DosingError> {
    let base = [
        ("target_od", parameters.target_od.to_string()),
        ("volume", parameters.volume.to_string()),
        ("dilutions", parameters.dilutions.to_string()),
        ("initial_alt_media", parameters.initial_alt_media.to_string()),
        (
            "alt_media_ratio_increase",
            parameters.alt_media_ratio_increase.to_string(),
        ),
    ];
    let pairs: Vec<(&str, &str)> = base
        .iter()
        .map(|(name, value)| {
            let value = overrides
                .iter()
                .find(|(override_name, _)| override_name == name)
                .map_or(value.as_str(), |(_, override_value)| *override_value);
            (*name, value)
        })
        .collect();
    DosingParameters::from_raw(&pairs)
}

async fn run(args: Args) -> Result<(), DosingError> {
    let mut config = TurbidostatIncreaseStressConfig::from_file(&args.filepath)?;
    config.parameters = apply_overrides(config.parameters, &args.overrides())?;

    let pumps: Box<dyn Write + Send> = match &args.pump_address {
        Some(address) => Box::new(TcpStream::connect(address)?),
        None => Box::new(std::io::stdout()),
    };
    let actuator = JsonLineActuator::new(pumps, config.unit(), config.experiment());
    let readings = LatestOdReadings::new();
    let automation = TurbidostatIncreaseStress::from_config(&config, readings.clone(), actuator)?;

    TurbidostatIncreaseStressController::start(automation, readings, &config).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
