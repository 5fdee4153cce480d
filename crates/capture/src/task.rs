use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use dm_async_util::sleep_until_or_cancel;
use dm_client::Task;
use dm_depth::{decode, persist, FrameEncoding};
use dm_types::{ImageRequest, ImageResponse, ImageType};
use dm_vehicle::{VehicleError, VehicleLink};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{preview::PreviewFrame, CaptureEvent};

pub struct CaptureTask {
    link: VehicleLink,
    save_dir: PathBuf,
    interval: Duration,
    encoding: FrameEncoding,
    requests: Vec<ImageRequest>,
    events_tx: flume::Sender<CaptureEvent>,
    events_rx: flume::Receiver<CaptureEvent>,
    preview_tx: Option<flume::Sender<PreviewFrame>>,
}

impl CaptureTask {
    pub(crate) fn new(
        link: VehicleLink,
        save_dir: PathBuf,
        interval: Duration,
        encoding: FrameEncoding,
        requests: Vec<ImageRequest>,
        preview_tx: Option<flume::Sender<PreviewFrame>>,
    ) -> Self {
        let (events_tx, events_rx) = flume::bounded(256);

        Self {
            link,
            save_dir,
            interval,
            encoding,
            requests,
            events_tx,
            events_rx,
            preview_tx,
        }
    }

    /// Outcome of every capture attempt. Events are dropped while the
    /// channel is full.
    pub fn events(&self) -> flume::Receiver<CaptureEvent> {
        self.events_rx.clone()
    }

    /// Folder the frames of this mission are written to.
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
}

pub(crate) fn image_requests(camera_name: &str, image_type: ImageType, scene: bool) -> Vec<ImageRequest> {
    let mut requests = vec![ImageRequest::float(camera_name, image_type)];

    if scene {
        requests.push(ImageRequest::bytes(camera_name, ImageType::Scene));
    }

    requests
}

#[async_trait]
impl Task for CaptureTask {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let Self {
            link,
            save_dir,
            interval,
            encoding,
            requests,
            events_tx,
            mut preview_tx,
            ..
        } = *self;

        if let Err(err) = tokio::fs::create_dir_all(&save_dir).await {
            warn!(
                "could not create frame save directory {}: {}",
                save_dir.display(),
                err
            );
        }

        let publish = |event: CaptureEvent| {
            if events_tx.try_send(event).is_err() {
                trace!("capture event channel full, dropping event");
            }
        };

        let mut next_start = Instant::now();

        // cancellation is only observed here, never while a frame is in flight
        while sleep_until_or_cancel(next_start, &cancel).await.is_ok() {
            let started = Instant::now();
            next_start = started + interval;

            let image = match link.capture_depth(requests.clone()).await {
                Ok(image) => image,
                Err(VehicleError::Disconnected) => bail!("vehicle link closed during capture"),
                Err(err) => {
                    warn!("no depth frame: {err}");
                    publish(CaptureEvent::Missed {
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let event = save(&image, &save_dir, encoding, &mut preview_tx).await;
            publish(event);
        }

        debug!("capture stopped");

        Ok(())
    }
}

async fn save(
    image: &ImageResponse,
    save_dir: &Path,
    encoding: FrameEncoding,
    preview_tx: &mut Option<flume::Sender<PreviewFrame>>,
) -> CaptureEvent {
    let timestamp = image.time_stamp;

    let frame = match decode(&image.image_data_float, image.width, image.height, timestamp) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("dropping frame {timestamp}: {err}");
            return CaptureEvent::Dropped {
                timestamp,
                reason: err.to_string(),
            };
        }
    };

    // a slow preview misses frames instead of holding up capture
    let preview_gone = match preview_tx {
        Some(tx) => matches!(
            tx.try_send(PreviewFrame::from(&frame)),
            Err(flume::TrySendError::Disconnected(_))
        ),
        None => false,
    };

    if preview_gone {
        debug!("preview is gone, no longer sending frames");
        *preview_tx = None;
    }

    match persist(&frame, save_dir, encoding).await {
        Ok(path) => {
            debug!("captured frame {timestamp}");
            CaptureEvent::Persisted { timestamp, path }
        }
        Err(err) => {
            warn!("dropping frame {timestamp}: {err}");
            CaptureEvent::Dropped {
                timestamp,
                reason: err.to_string(),
            }
        }
    }
}
