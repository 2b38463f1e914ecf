//! Live camera capture through a GStreamer appsink
//!
//! The pipeline is `source ! videoconvert ! RGBA caps ! appsink`. Nothing
//! scales, so frames arrive at whatever size the device negotiated: the
//! configured size when it offers it, its own native mode otherwise.
//! The appsink keeps only the newest buffer, so polling always sees the
//! current frame and never a backlog.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::frame::Frame;
use crate::config::TerminalConfig;
use crate::error::ScanError;

/// How long acquisition waits for the device to deliver its first frame
const FIRST_FRAME_TIMEOUT_SECS: u64 = 5;

/// What to ask the camera for
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// v4l2 device path (None = autovideosrc)
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl From<&TerminalConfig> for CameraSettings {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            device: config.camera_device.clone(),
            width: config.frame_width,
            height: config.frame_height,
            framerate: config.framerate,
        }
    }
}

impl CameraSettings {
    /// Size hint as GStreamer caps values
    fn preferred_size(&self) -> Result<(i32, i32), ScanError> {
        match (i32::try_from(self.width), i32::try_from(self.height)) {
            (Ok(width), Ok(height)) if width > 0 && height > 0 => Ok((width, height)),
            _ => Err(ScanError::CameraUnavailable(format!(
                "unsupported frame size {}x{}",
                self.width, self.height
            ))),
        }
    }
}

fn unavailable(what: &'static str) -> impl FnOnce(gst::glib::BoolError) -> ScanError {
    move |err| ScanError::CameraUnavailable(format!("{what}: {err}"))
}

/// Exclusive owner of the camera stream for one session
pub struct Camera {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl Camera {
    /// Open the camera and wait for its first frame
    pub async fn acquire(settings: CameraSettings) -> Result<Self, ScanError> {
        tokio::task::spawn_blocking(move || Self::open(&settings))
            .await
            .map_err(|err| ScanError::CameraUnavailable(format!("acquisition aborted: {err}")))?
    }

    fn open(settings: &CameraSettings) -> Result<Self, ScanError> {
        gst::init().map_err(|err| {
            ScanError::CameraUnavailable(format!("Failed to initialize GStreamer: {err}"))
        })?;

        log::info!(
            "Opening camera {} at {}x{} @ {} fps",
            settings.device.as_deref().unwrap_or("(auto)"),
            settings.width,
            settings.height,
            settings.framerate
        );

        let pipeline = gst::Pipeline::new();

        let source = match &settings.device {
            Some(device) => gst::ElementFactory::make("v4l2src")
                .property("device", device.as_str())
                .build()
                .map_err(unavailable("Failed to create v4l2src"))?,
            None => gst::ElementFactory::make("autovideosrc")
                .build()
                .map_err(unavailable("Failed to create autovideosrc"))?,
        };

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(unavailable("Failed to create videoconvert element"))?;

        let (width, height) = settings.preferred_size()?;
        // Structures are tried in order; the second accepts any size the source offers
        let caps = gst::Caps::builder_full()
            .structure(
                gst::Structure::builder("video/x-raw")
                    .field("format", "RGBA")
                    .field("width", width)
                    .field("height", height)
                    .build(),
            )
            .structure(
                gst::Structure::builder("video/x-raw")
                    .field("format", "RGBA")
                    .build(),
            )
            .build();

        let appsink = gst_app::AppSink::builder()
            .name("frames")
            .caps(&caps)
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .build();

        pipeline
            .add_many([&source, &videoconvert, appsink.upcast_ref()])
            .map_err(unavailable("Failed to assemble pipeline"))?;
        gst::Element::link_many([&source, &videoconvert, appsink.upcast_ref()])
            .map_err(unavailable("Failed to link pipeline"))?;

        // Dropping `camera` on any error below tears the pipeline down again
        let camera = Self { pipeline, appsink };

        camera
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| ScanError::CameraUnavailable(camera.bus_error()))?;

        if camera
            .appsink
            .try_pull_sample(gst::ClockTime::from_seconds(FIRST_FRAME_TIMEOUT_SECS))
            .is_none()
        {
            return Err(ScanError::CameraUnavailable(camera.bus_error()));
        }

        log::info!("Camera stream started");
        Ok(camera)
    }

    /// Most useful description of why the pipeline failed
    fn bus_error(&self) -> String {
        self.pipeline
            .bus()
            .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
            .and_then(|msg| match msg.view() {
                gst::MessageView::Error(err) => Some(format!(
                    "{} ({})",
                    err.error(),
                    err.debug().unwrap_or_default()
                )),
                _ => None,
            })
            .unwrap_or_else(|| "no frame received from device".to_string())
    }

    /// Take the current frame if a new one arrived since the last poll
    pub fn poll(&self) -> Option<Frame> {
        let sample = self.appsink.try_pull_sample(gst::ClockTime::ZERO)?;
        match sample_to_frame(&sample) {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::debug!("Dropping unusable camera sample: {}", err);
                None
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gst::State::Null) {
            log::warn!("Failed to stop camera pipeline: {}", err);
        } else {
            log::info!("Camera released");
        }
    }
}

fn sample_to_frame(sample: &gst::Sample) -> anyhow::Result<Frame> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| anyhow::anyhow!("Sample has no buffer"))?;
    let caps = sample
        .caps()
        .ok_or_else(|| anyhow::anyhow!("Sample has no caps"))?;
    let info = gst_video::VideoInfo::from_caps(caps)?;
    let map = buffer.map_readable()?;

    let stride = info.stride()[0] as usize;
    Frame::from_plane(info.width(), info.height(), stride, map.as_slice())
        .ok_or_else(|| anyhow::anyhow!("Buffer smaller than {}x{} RGBA", info.width(), info.height()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = TerminalConfig {
            camera_device: Some("/dev/video1".to_string()),
            ..TerminalConfig::default()
        };
        let settings = CameraSettings::from(&config);
        assert_eq!(settings.device.as_deref(), Some("/dev/video1"));
        assert_eq!((settings.width, settings.height), (1280, 720));
    }

    #[test]
    fn test_preferred_size_rejects_out_of_range() {
        let mut settings = CameraSettings::from(&TerminalConfig::default());
        assert_eq!(settings.preferred_size().unwrap(), (1280, 720));

        settings.width = u32::MAX;
        assert!(matches!(
            settings.preferred_size(),
            Err(ScanError::CameraUnavailable(_))
        ));

        settings.width = 0;
        assert!(settings.preferred_size().is_err());
    }

    #[test]
    #[ignore]
    fn test_capture_one_frame() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let camera = rt
            .block_on(Camera::acquire(CameraSettings::from(&TerminalConfig::default())))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        let frame = camera.poll().unwrap();
        // Native size when the device has no 1280x720 mode
        assert!(frame.width() > 0 && frame.height() > 0);
        assert_eq!(frame.rgba.as_raw().len(), (frame.width() * frame.height() * 4) as usize);
    }
}
