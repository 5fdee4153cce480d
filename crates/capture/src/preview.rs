use dm_depth::DepthFrame;

/// A normalized frame on its way to the preview window. Rows are padded to a
/// multiple of four bytes, the stride GStreamer expects for 8-bit gray video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl From<&DepthFrame> for PreviewFrame {
    fn from(frame: &DepthFrame) -> Self {
        let (width, height) = (frame.cols(), frame.rows());
        let stride = (width + 3) & !3;

        let mut data = vec![0; stride * height];
        for (row, pixels) in frame.normalized().chunks(width).enumerate() {
            data[row * stride..row * stride + width].copy_from_slice(pixels);
        }

        Self {
            width: width as u32,
            height: height as u32,
            stride,
            data,
        }
    }
}

#[cfg(feature = "preview")]
pub use task::*;

#[cfg(feature = "preview")]
mod task {
    use anyhow::{anyhow, Context};
    use async_trait::async_trait;
    use dm_client::Task;
    use futures::StreamExt;
    use gstreamer::{self as gst, prelude::*};
    use gstreamer_app::AppSrc;
    use tokio::select;
    use tokio_util::sync::CancellationToken;
    use tracing::*;

    use super::PreviewFrame;
    use crate::PreviewConfig;

    pub struct PreviewTask {
        sink: String,
        frame_rx: flume::Receiver<PreviewFrame>,
    }

    pub fn create_task(
        config: PreviewConfig,
        frame_rx: flume::Receiver<PreviewFrame>,
    ) -> anyhow::Result<PreviewTask> {
        Ok(PreviewTask {
            sink: config.sink,
            frame_rx,
        })
    }

    fn caps(frame: &PreviewFrame) -> gst::Caps {
        gst::Caps::builder("video/x-raw")
            .field("format", "GRAY8")
            .field("width", frame.width as i32)
            .field("height", frame.height as i32)
            .field("framerate", gst::Fraction::new(0, 1))
            .build()
    }

    #[async_trait]
    impl Task for PreviewTask {
        fn name(&self) -> &'static str {
            "capture/preview"
        }

        async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
            let Self { sink, frame_rx } = *self;

            debug!("initializing depth preview");

            gst::init().context("failed to init gstreamer")?;

            let pipeline = gst::Pipeline::new();

            // app source to put depth frames into gstreamer
            let appsrc = AppSrc::builder()
                .name("depthsrc")
                .format(gst::Format::Time)
                .is_live(true)
                .do_timestamp(true)
                .build();

            let convert = gst::ElementFactory::make("videoconvert")
                .build()
                .context("failed to create videoconvert")?;
            let sink = gst::ElementFactory::make(&sink)
                .build()
                .with_context(|| format!("failed to create preview sink {sink}"))?;

            pipeline.add_many([appsrc.upcast_ref(), &convert, &sink])?;
            gst::Element::link_many([appsrc.upcast_ref(), &convert, &sink])?;

            let bus = pipeline.bus().context("failed to get element bus")?;
            let mut bus_stream = bus.stream();

            pipeline
                .set_state(gst::State::Playing)
                .context("could not start gstreamer pipeline")?;

            let mut shape = None;

            loop {
                select! {
                    frame = frame_rx.recv_async() => {
                        let Ok(frame) = frame else {
                            debug!("capture stopped sending frames, exiting loop");
                            break;
                        };

                        if shape != Some((frame.width, frame.height)) {
                            appsrc.set_caps(Some(&caps(&frame)));
                            shape = Some((frame.width, frame.height));
                        }

                        let buf = gst::Buffer::from_mut_slice(frame.data);
                        appsrc.push_buffer(buf).context("failed to push buffer to appsrc")?;

                        trace!("pushed frame to appsrc");
                    }

                    msg = bus_stream.next() => {
                        use gst::MessageView;

                        let Some(msg) = msg else {
                            debug!("message stream ended");
                            break;
                        };

                        match msg.view() {
                            MessageView::Eos(..) => {
                                debug!("received eos from gstreamer");
                                break;
                            }
                            MessageView::Error(err) => {
                                pipeline.set_state(gst::State::Null).ok();
                                return Err(anyhow!(err.error()));
                            }
                            _ => (),
                        }
                    }

                    _ = cancel.cancelled() => {
                        break;
                    }
                }
            }

            appsrc.end_of_stream().context("ending stream failed")?;
            pipeline
                .set_state(gst::State::Null)
                .context("error while stopping pipeline")?;

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_four_bytes() {
        // 3 rows of 2 columns
        let frame = dm_depth::decode(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 3, 2, 0).unwrap();
        let preview = PreviewFrame::from(&frame);

        assert_eq!((preview.width, preview.height, preview.stride), (2, 3, 4));
        assert_eq!(preview.data.len(), 12);

        let normalized = frame.normalized();
        for row in 0..3 {
            assert_eq!(&preview.data[row * 4..row * 4 + 2], &normalized[row * 2..row * 2 + 2]);
            assert_eq!(&preview.data[row * 4 + 2..row * 4 + 4], &[0u8, 0]);
        }
    }
}
