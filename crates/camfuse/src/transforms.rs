//! Chain steps of the per-camera detection pipeline.

use crate::detect::Detect;
use crate::frame::{DetectionResult, Frame};
use camfuse_pipeline::{Transform, TransformError};

const MARKER_RADIUS: i32 = 5;
const MARKER_COLOR: [u8; 3] = [255, 0, 0];

/// Runs the camera's detector over the batch's frame and produces the
/// detection result flowing to the fusion stage.
pub struct DetectStep {
    detector: Box<dyn Detect>,
}

impl DetectStep {
    pub fn new(detector: Box<dyn Detect>) -> Self {
        Self { detector }
    }
}

impl Transform for DetectStep {
    type Input = Vec<Frame>;
    type Output = DetectionResult;

    fn apply(&mut self, batch: Vec<Frame>) -> Result<DetectionResult, TransformError> {
        let frame = batch.into_iter().next().ok_or(TransformError::EmptyBatch)?;
        let objects = self
            .detector
            .detect(&frame)
            .map_err(|e| TransformError::Failed(e.to_string()))?;
        Ok(DetectionResult {
            camera_id: frame.camera_id,
            timestamp_ns: frame.timestamp_ns,
            image: frame.image,
            objects,
        })
    }
}

/// Paints a marker over every detected center so the annotated image can be
/// rendered downstream.
pub struct AnnotateStep;

impl Transform for AnnotateStep {
    type Input = DetectionResult;
    type Output = DetectionResult;

    fn apply(&mut self, mut result: DetectionResult) -> Result<DetectionResult, TransformError> {
        for observation in result.objects.values() {
            let (cx, cy) = observation.center;
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                for dy in -MARKER_RADIUS..=MARKER_RADIUS {
                    result.image.set_pixel(cx + dx, cy + dy, MARKER_COLOR);
                }
            }
        }
        Ok(result)
    }
}
