use anyhow::Context;
use clap::Parser;
use dm_vehicle::VehicleKind;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::mission::{MissionRunner, MissionState};

#[macro_use]
extern crate tracing;

mod cli;
mod config;
mod mission;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // setup colorful backtraces
    color_backtrace::install();

    let mut targets = tracing_subscriber::filter::Targets::new().with_default(LevelFilter::INFO);

    if let Ok(directives) = std::env::var("RUST_LOG") {
        for directive in directives.split(',') {
            if let Some((target, level)) = directive.split_once('=') {
                targets = targets.with_target(
                    target,
                    level.parse::<LevelFilter>().context("invalid log level")?,
                );
            } else {
                targets = targets.with_default(
                    directive
                        .parse::<LevelFilter>()
                        .context("invalid log level")?,
                );
            }
        }
    }

    let (writer, _guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::hourly("logs", "depth-mission"));

    let reg = tracing_subscriber::registry();

    #[cfg(tokio_unstable)]
    let reg = reg.with(console_subscriber::spawn());

    reg
        // writer that outputs to console
        .with(tracing_subscriber::fmt::layer().with_filter(targets))
        // writer that outputs to files
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(Targets::new().with_targets(vec![
                    ("depth_mission", LevelFilter::DEBUG),
                    ("dm_vehicle", LevelFilter::DEBUG),
                    ("dm_flight", LevelFilter::DEBUG),
                    ("dm_capture", LevelFilter::DEBUG),
                    ("dm_depth", LevelFilter::DEBUG),
                ])),
        )
        .init();

    let main_args: cli::args::MainArgs = cli::args::MainArgs::parse();

    debug!("reading config from {:?}", &main_args.config);
    let mut config = crate::config::MissionConfig::read_from_path(&main_args.config)
        .context("failed to read config file")?;

    if main_args.dry_run {
        info!("dry run, flying the software vehicle");
        config.vehicle.interface = VehicleKind::Software;
    }

    let cancellation_token = CancellationToken::new();

    ctrlc::set_handler({
        let cancellation_token = cancellation_token.clone();
        move || {
            info!("received interrupt, aborting mission");
            cancellation_token.cancel();
        }
    })
    .context("could not set ctrl+c handler")?;

    let runner = MissionRunner::new(config);

    match runner.run(cancellation_token).await? {
        MissionState::Failed(reason) => warn!("mission did not complete: {reason}"),
        state => info!("mission {state}"),
    }

    Ok(())
}
