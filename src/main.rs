use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gtfs_to_osm::{convert_gtfs_to_osm, CliOptions};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = CliOptions::parse();

    let default_filter = if cli.verbose {
        "gtfs_to_osm=debug"
    } else {
        "gtfs_to_osm=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = match cli.convert_options() {
        Ok(options) => options,
        Err(e) => {
            error!(error = %e, "Invalid options");
            return Ok(ExitCode::FAILURE);
        }
    };
    let config = cli.load_config()?;

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            info!(dir = %parent.display(), "Creating output directory");
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(input = %cli.input.display(), output = %cli.output.display(), "Starting conversion");
    let summary = convert_gtfs_to_osm(&cli.input, &cli.output, &options, &config).await?;
    info!(
        route_relations = summary.route_relations,
        route_masters = summary.route_masters,
        new_stops = summary.placeholder_stops,
        "Done"
    );

    Ok(ExitCode::SUCCESS)
}
