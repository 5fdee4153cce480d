//! Periodic depth capture while the vehicle flies.

use anyhow::bail;
use dm_client::Task;
use dm_vehicle::VehicleLink;

pub mod config;
pub mod event;
pub mod preview;
pub mod task;

pub use config::*;
pub use event::*;
pub use task::CaptureTask;

/// Builds the capture task and, when configured, the preview fed by it.
pub fn create_tasks(
    config: CaptureConfig,
    link: VehicleLink,
) -> anyhow::Result<(CaptureTask, Option<Box<dyn Task>>)> {
    let interval = match config.interval() {
        Some(interval) => interval,
        None => bail!("capture frame rate must be positive, got {}", config.frame_rate),
    };

    let mut save_dir = config.save_path.clone();
    // save inside of a folder named after the current date and time
    save_dir.push(chrono::Local::now().format("%FT%H-%M-%S").to_string());

    let requests = task::image_requests(&config.camera_name, config.image_type, config.request_scene);

    let (preview_tx, preview) = create_preview(config.preview)?;

    let capture = CaptureTask::new(
        link,
        save_dir,
        interval,
        config.encoding,
        requests,
        preview_tx,
    );

    Ok((capture, preview))
}

#[cfg(feature = "preview")]
fn create_preview(
    config: Option<PreviewConfig>,
) -> anyhow::Result<(
    Option<flume::Sender<preview::PreviewFrame>>,
    Option<Box<dyn Task>>,
)> {
    let Some(config) = config else {
        return Ok((None, None));
    };

    // a few frames of slack; the capture side never waits on it
    let (frame_tx, frame_rx) = flume::bounded(2);
    let task = preview::create_task(config, frame_rx)?;

    Ok((Some(frame_tx), Some(Box::new(task))))
}

#[cfg(not(feature = "preview"))]
fn create_preview(
    config: Option<PreviewConfig>,
) -> anyhow::Result<(
    Option<flume::Sender<preview::PreviewFrame>>,
    Option<Box<dyn Task>>,
)> {
    if config.is_some() {
        tracing::warn!("preview is configured but this build has no preview support");
    }

    Ok((None, None))
}
