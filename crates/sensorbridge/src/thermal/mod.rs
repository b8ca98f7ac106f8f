//! Thermal fire-detection pipeline.
//!
//! Each iteration reads an 8x8 frame, classifies it with [`FireDetector`],
//! renders an annotated JPEG and posts it to the viewer endpoint.

pub mod detect;
pub mod frame;
pub mod render;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

pub use detect::{BoundingBox, Detection, DetectionStage, FireDetector};
pub use frame::{FrameStats, ThermalFrame, ThermalSensor};
pub use render::Renderer;
pub use upload::{DryRunUploader, HttpUploader, ImageUploader};

use crate::config::ThermalConfig;
use crate::error::{Error, Result};
use crate::monitor::PipelineHandle;

/// The result of one pipeline iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalReport {
    /// The detection for the frame.
    pub detection: Detection,
    /// HTTP status returned by the upload endpoint.
    pub status: u16,
}

impl ThermalReport {
    /// Whether the endpoint accepted the image.
    #[must_use]
    pub fn accepted(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Detection plus rendering for one frame.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    detector: FireDetector,
    renderer: Arc<Renderer>,
}

impl FrameProcessor {
    /// Combine a detector and a renderer.
    #[must_use]
    pub fn new(detector: FireDetector, renderer: Renderer) -> Self {
        Self {
            detector,
            renderer: Arc::new(renderer),
        }
    }

    /// The renderer in use.
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Classify a frame and render the annotated JPEG.
    ///
    /// Rendering runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub async fn process(&self, frame: ThermalFrame) -> Result<(Detection, Vec<u8>)> {
        let detection = self.detector.detect(&frame);
        let renderer = Arc::clone(&self.renderer);
        let jpeg = tokio::task::spawn_blocking(move || renderer.render_jpeg(&frame, &detection))
            .await
            .map_err(|e| Error::internal(format!("render task failed: {e}")))??;
        Ok((detection, jpeg))
    }
}

/// Read-detect-render-upload loop.
pub struct ThermalPipeline {
    sensor: Option<Box<dyn ThermalSensor>>,
    processor: FrameProcessor,
    uploader: Arc<dyn ImageUploader>,
    interval: Duration,
}

impl std::fmt::Debug for ThermalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThermalPipeline")
            .field("sensor", &self.sensor.as_ref().map(|s| s.name()))
            .field("processor", &self.processor)
            .field("uploader", &self.uploader.name())
            .field("interval", &self.interval)
            .finish()
    }
}

impl ThermalPipeline {
    /// Assemble a pipeline from its parts.
    #[must_use]
    pub fn new(
        sensor: Box<dyn ThermalSensor>,
        processor: FrameProcessor,
        uploader: Arc<dyn ImageUploader>,
        interval: Duration,
    ) -> Self {
        Self {
            sensor: Some(sensor),
            processor,
            uploader,
            interval,
        }
    }

    /// Create a pipeline from configuration.
    #[must_use]
    pub fn from_config(
        sensor: Box<dyn ThermalSensor>,
        uploader: Arc<dyn ImageUploader>,
        config: &ThermalConfig,
    ) -> Self {
        let processor = FrameProcessor::new(
            FireDetector::new(config.detection.clone()),
            Renderer::from_config(config),
        );
        Self::new(
            sensor,
            processor,
            uploader,
            config.interval(),
        )
    }

    /// Run one iteration: read, detect, render and upload.
    ///
    /// # Errors
    ///
    /// Returns the sensor, render or upload error of this attempt.
    pub async fn poll_once(&mut self) -> Result<ThermalReport> {
        let frame = self.read_sensor().await?;
        let (detection, jpeg) = self.processor.process(frame).await?;
        let status = self.uploader.upload(jpeg).await?;
        Ok(ThermalReport { detection, status })
    }

    /// Run until the handle is stopped.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; failed iterations are logged.
    pub async fn run(mut self, handle: PipelineHandle) -> Result<()> {
        info!(
            interval = ?self.interval,
            uploader = self.uploader.name(),
            labels = self.processor.renderer().has_font(),
            "Thermal pipeline started"
        );

        loop {
            match self.poll_once().await {
                Ok(report) => {
                    let d = &report.detection;
                    info!(
                        stage = %d.stage,
                        max = %format!("{:.2}", d.max),
                        "Upload status: {} | fire: {}",
                        report.status,
                        d.fire
                    );
                    if d.fire {
                        warn!(bbox = ?d.bbox, "Fire detected");
                    }
                    if report.accepted() {
                        handle.record_transmitted();
                    } else {
                        handle.record_failure();
                    }
                }
                Err(e) if e.is_transient_sensor_error() => {
                    warn!("Failed to read thermal sensor: {e}");
                    handle.record_failure();
                }
                Err(e) => {
                    error!("Thermal iteration failed: {e}");
                    handle.record_failure();
                }
            }
            handle.record_iteration();

            if !handle.sleep(self.interval).await {
                break;
            }
        }

        info!("Thermal pipeline stopped");
        Ok(())
    }

    async fn read_sensor(&mut self) -> Result<ThermalFrame> {
        let mut sensor = self
            .sensor
            .take()
            .ok_or_else(|| Error::internal("thermal sensor lost after a failed read"))?;

        let (sensor, frame) = tokio::task::spawn_blocking(move || {
            let frame = sensor.read_frame();
            (sensor, frame)
        })
        .await
        .map_err(|e| Error::internal(format!("sensor read task failed: {e}")))?;
        self.sensor = Some(sensor);

        Ok(frame?)
    }
}
