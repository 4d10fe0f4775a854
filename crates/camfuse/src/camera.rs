//! One managed camera: an opened device, a periodic acquisition driver and a
//! detection worker, bound to a persistent output channel feeding the fusion
//! sink.

use crate::detect::DetectorFactory;
use crate::device::FrameGrabber;
use crate::frame::{CameraId, DetectionResult, Frame};
use crate::transforms::{AnnotateStep, DetectStep};
use camfuse_pipeline::{PeriodicDriver, Poll, Transform, Worker};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Inactive,
    Active,
}

pub(crate) fn period_from_rate(rate_hz: f64) -> Duration {
    Duration::from_secs_f64(1.0 / rate_hz)
}

/// Adapts the opened grabber to the pipeline's acquisition seam. The grabber
/// is shared so the camera can be started and stopped repeatedly without
/// reopening the device.
struct GrabberSource {
    grabber: Arc<Mutex<Box<dyn FrameGrabber>>>,
    camera_id: CameraId,
}

impl Poll for GrabberSource {
    type Item = Frame;

    fn poll(&mut self) -> Option<Frame> {
        let image = self.grabber.lock().ok()?.read()?;
        Some(Frame::new(image, self.camera_id))
    }
}

pub struct Camera {
    id: CameraId,
    rate_hz: f64,
    status: CameraStatus,
    grabber: Arc<Mutex<Box<dyn FrameGrabber>>>,
    detectors: Arc<dyn DetectorFactory>,
    output_tx: flume::Sender<DetectionResult>,
    driver: Option<PeriodicDriver>,
    worker: Option<Worker>,
}

impl Camera {
    pub(crate) fn new(
        id: CameraId,
        rate_hz: f64,
        grabber: Box<dyn FrameGrabber>,
        detectors: Arc<dyn DetectorFactory>,
        output_tx: flume::Sender<DetectionResult>,
    ) -> Self {
        Self {
            id,
            rate_hz,
            status: CameraStatus::Inactive,
            grabber: Arc::new(Mutex::new(grabber)),
            detectors,
            output_tx,
            driver: None,
            worker: None,
        }
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn status(&self) -> CameraStatus {
        self.status
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Launches the acquisition driver and detection worker. Idempotent: an
    /// already-active camera keeps its running thread pair.
    pub fn start(&mut self) {
        if self.status == CameraStatus::Active {
            return;
        }
        let (frame_tx, frame_rx) = flume::unbounded();
        let source = GrabberSource {
            grabber: Arc::clone(&self.grabber),
            camera_id: self.id,
        };
        let driver = PeriodicDriver::spawn(source, vec![frame_tx], period_from_rate(self.rate_hz));
        let chain = DetectStep::new(self.detectors.build(self.id)).then(AnnotateStep);
        let worker = Worker::spawn(vec![frame_rx], vec![self.output_tx.clone()], chain);
        self.driver = Some(driver);
        self.worker = Some(worker);
        self.status = CameraStatus::Active;
        log::info!("camera {} started at {} Hz", self.id, self.rate_hz);
    }

    /// Halts acquisition and detection. Returns only after both threads have
    /// drained and joined: once `stop()` returns, this camera publishes
    /// nothing more. Idempotent.
    pub fn stop(&mut self) {
        // Driver first, so every frame it already acquired is queued before
        // the worker drains.
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        if self.status == CameraStatus::Active {
            log::info!("camera {} stopped", self.id);
        }
        self.status = CameraStatus::Inactive;
    }

    /// Retunes the acquisition rate without restarting the pipeline.
    pub fn set_rate(&mut self, rate_hz: f64) {
        self.rate_hz = rate_hz;
        if let Some(driver) = &self.driver {
            driver.set_period(period_from_rate(rate_hz));
        }
    }
}
