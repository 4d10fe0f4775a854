//! Detector seam.
//!
//! The detection algorithms themselves are external collaborators; the
//! pipeline only needs `Detect`: frame in, identity observations out. The
//! fiducial and neural-network variants here adapt those algorithms (behind
//! their own seams) to the pipeline, and are selected per camera from the
//! configuration at assembly time.

use crate::config::{Config, DetectorConfig};
use crate::frame::{CameraId, Detections, Frame, ImageBuffer, LocalObservation, TrackedIdentity};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector failed: {0}")]
    Failed(String),
}

/// Frame in, identity observations out.
pub trait Detect: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Detections, DetectError>;
}

/// Builds the configured detector for one camera each time its pipeline is
/// assembled.
pub trait DetectorFactory: Send + Sync {
    fn build(&self, camera: CameraId) -> Box<dyn Detect>;
}

/// One decoded fiducial tag: id, center and corner points in pixel space.
#[derive(Debug, Clone, Copy)]
pub struct TagDetection {
    pub tag_id: u32,
    pub center: (f64, f64),
    pub corners: [(f64, f64); 4],
}

/// Seam for the external fiducial decoding algorithm.
pub trait DecodeTags: Send {
    fn decode(&mut self, image: &ImageBuffer) -> Vec<TagDetection>;
}

/// Decoder that never finds a tag; stands in where no real decoder is wired.
pub struct NullTagDecoder;

impl DecodeTags for NullTagDecoder {
    fn decode(&mut self, _image: &ImageBuffer) -> Vec<TagDetection> {
        Vec::new()
    }
}

/// Maps decoded fiducial tags to configured tracked identities.
pub struct MarkerDetector {
    decoder: Box<dyn DecodeTags>,
    identities: HashMap<u32, TrackedIdentity>,
}

impl MarkerDetector {
    pub fn new(decoder: Box<dyn DecodeTags>, identities: HashMap<u32, TrackedIdentity>) -> Self {
        Self {
            decoder,
            identities,
        }
    }
}

impl Detect for MarkerDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detections, DetectError> {
        let mut objects = Detections::new();
        for tag in self.decoder.decode(&frame.image) {
            let Some(&identity) = self.identities.get(&tag.tag_id) else {
                continue;
            };
            objects.insert(
                identity,
                LocalObservation {
                    center: (tag.center.0 as i32, tag.center.1 as i32),
                    rotation: tag_rotation(&tag.corners),
                },
            );
        }
        Ok(objects)
    }
}

/// Tag orientation from the first and last corner points.
fn tag_rotation(corners: &[(f64, f64); 4]) -> f64 {
    let (ax, ay) = corners[0];
    let (dx, dy) = corners[3];
    let edge = ((ax - dx).powi(2) + (ay - dy).powi(2)).sqrt();
    if edge == 0.0 {
        return 0.0;
    }
    let mut angle = ((ay - dy) / edge).acos();
    if ax - dx < 0.0 {
        angle += std::f64::consts::PI;
    }
    angle
}

/// An axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Seam for the external neural-network inference algorithm.
pub trait PredictBoxes: Send {
    fn predict(&mut self, image: &ImageBuffer) -> Vec<BoundingBox>;
}

/// Inference stub returning the same two boxes for every frame.
pub struct MockedBoxes;

impl PredictBoxes for MockedBoxes {
    fn predict(&mut self, _image: &ImageBuffer) -> Vec<BoundingBox> {
        vec![
            BoundingBox {
                x: 20,
                y: 40,
                width: 50,
                height: 100,
            },
            BoundingBox {
                x: 70,
                y: 90,
                width: 10,
                height: 120,
            },
        ]
    }
}

/// Assigns predicted bounding boxes to the configured identities, in
/// order; boxes carry no orientation, so rotation is zero.
pub struct NeuralNetDetector {
    backend: Box<dyn PredictBoxes>,
    identities: Vec<TrackedIdentity>,
}

impl NeuralNetDetector {
    pub fn new(backend: Box<dyn PredictBoxes>, identities: Vec<TrackedIdentity>) -> Self {
        Self {
            backend,
            identities,
        }
    }
}

impl Detect for NeuralNetDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detections, DetectError> {
        let boxes = self.backend.predict(&frame.image);
        let objects = self
            .identities
            .iter()
            .zip(boxes)
            .map(|(&identity, bbox)| {
                (
                    identity,
                    LocalObservation {
                        center: bbox.center(),
                        rotation: 0.0,
                    },
                )
            })
            .collect();
        Ok(objects)
    }
}

/// Reports the same observations for every frame; used for tests and the
/// synthetic daemon profile.
pub struct FixedDetector {
    objects: Detections,
}

impl FixedDetector {
    pub fn new(objects: Detections) -> Self {
        Self { objects }
    }
}

impl Detect for FixedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Detections, DetectError> {
        Ok(self.objects.clone())
    }
}

/// Runs several detectors over the same frame and merges their outputs.
/// Identities are disjoint by configuration, so merge order is immaterial.
pub struct CompositeDetector {
    parts: Vec<Box<dyn Detect>>,
}

impl CompositeDetector {
    pub fn new(parts: Vec<Box<dyn Detect>>) -> Self {
        Self { parts }
    }
}

impl Detect for CompositeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detections, DetectError> {
        let mut objects = Detections::new();
        for part in &mut self.parts {
            objects.extend(part.detect(frame)?);
        }
        Ok(objects)
    }
}

/// Makes fresh tag decoders for marker detectors.
pub trait DecoderProvider: Send + Sync {
    fn make(&self) -> Box<dyn DecodeTags>;
}

/// Makes fresh inference backends for neural-net detectors.
pub trait PredictorProvider: Send + Sync {
    fn make(&self, score_threshold: f32) -> Box<dyn PredictBoxes>;
}

pub struct NullDecoderProvider;

impl DecoderProvider for NullDecoderProvider {
    fn make(&self) -> Box<dyn DecodeTags> {
        Box::new(NullTagDecoder)
    }
}

pub struct MockedPredictorProvider;

impl PredictorProvider for MockedPredictorProvider {
    fn make(&self, _score_threshold: f32) -> Box<dyn PredictBoxes> {
        Box::new(MockedBoxes)
    }
}

/// Assembles the detector described by the configuration's object list:
/// marker entries share one fiducial decoder, neural-net entries share one
/// inference backend, fixed entries become a fixed detector.
pub struct ConfigDetectorFactory {
    config: Arc<Config>,
    decoders: Arc<dyn DecoderProvider>,
    predictors: Arc<dyn PredictorProvider>,
}

impl ConfigDetectorFactory {
    pub fn new(
        config: Arc<Config>,
        decoders: Arc<dyn DecoderProvider>,
        predictors: Arc<dyn PredictorProvider>,
    ) -> Self {
        Self {
            config,
            decoders,
            predictors,
        }
    }

    /// Factory with stub backends: no real fiducial decoder, mocked
    /// inference.
    pub fn with_stub_backends(config: Arc<Config>) -> Self {
        Self::new(
            config,
            Arc::new(NullDecoderProvider),
            Arc::new(MockedPredictorProvider),
        )
    }
}

impl DetectorFactory for ConfigDetectorFactory {
    fn build(&self, _camera: CameraId) -> Box<dyn Detect> {
        let mut tags = HashMap::new();
        let mut nn_identities = Vec::new();
        let mut nn_threshold = None;
        let mut fixed = Detections::new();

        for object in &self.config.objects {
            match object.detector {
                DetectorConfig::Marker { tag_id } => {
                    tags.insert(tag_id, object.id);
                }
                DetectorConfig::NeuralNet { score_threshold } => {
                    nn_threshold.get_or_insert(score_threshold);
                    nn_identities.push(object.id);
                }
                DetectorConfig::Fixed { x, y, rotation } => {
                    fixed.insert(
                        object.id,
                        LocalObservation {
                            center: (x, y),
                            rotation,
                        },
                    );
                }
            }
        }

        let mut parts: Vec<Box<dyn Detect>> = Vec::new();
        if !tags.is_empty() {
            parts.push(Box::new(MarkerDetector::new(self.decoders.make(), tags)));
        }
        if let Some(threshold) = nn_threshold {
            parts.push(Box::new(NeuralNetDetector::new(
                self.predictors.make(threshold),
                nn_identities,
            )));
        }
        if !fixed.is_empty() {
            parts.push(Box::new(FixedDetector::new(fixed)));
        }
        Box::new(CompositeDetector::new(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::f64::consts::PI;

    fn frame() -> Frame {
        Frame::new(ImageBuffer::new(8, 8), CameraId(0))
    }

    fn square_corners(a: (f64, f64), d: (f64, f64)) -> [(f64, f64); 4] {
        [a, (0.0, 0.0), (0.0, 0.0), d]
    }

    #[test]
    fn tag_rotation_follows_first_to_last_corner() {
        // Corner A straight above corner D: zero rotation.
        let upright = square_corners((0.0, 0.0), (0.0, -2.0));
        assert!(tag_rotation(&upright).abs() < 1e-9);

        // Flipped: half a turn.
        let flipped = square_corners((0.0, 0.0), (0.0, 2.0));
        assert!((tag_rotation(&flipped) - PI).abs() < 1e-9);

        // Quarter turns distinguish left from right via the x sign.
        let quarter = square_corners((0.0, 0.0), (-2.0, 0.0));
        assert!((tag_rotation(&quarter) - PI / 2.0).abs() < 1e-9);
        let three_quarter = square_corners((0.0, 0.0), (2.0, 0.0));
        assert!((tag_rotation(&three_quarter) - 3.0 * PI / 2.0).abs() < 1e-9);
    }

    struct OneTag(TagDetection);

    impl DecodeTags for OneTag {
        fn decode(&mut self, _image: &ImageBuffer) -> Vec<TagDetection> {
            vec![self.0]
        }
    }

    #[test]
    fn marker_detector_maps_configured_tags_only() {
        let tag = TagDetection {
            tag_id: 7,
            center: (12.9, 34.2),
            corners: square_corners((0.0, 0.0), (0.0, -2.0)),
        };
        let mut known = HashMap::new();
        known.insert(7, TrackedIdentity(1));
        let mut detector = MarkerDetector::new(Box::new(OneTag(tag)), known);
        let objects = detector.detect(&frame()).unwrap();
        assert_eq!(objects[&TrackedIdentity(1)].center, (12, 34));

        let mut unknown = MarkerDetector::new(Box::new(OneTag(tag)), HashMap::new());
        assert!(unknown.detect(&frame()).unwrap().is_empty());
    }

    #[test]
    fn neural_net_detector_assigns_boxes_to_identities_in_order() {
        let mut detector = NeuralNetDetector::new(
            Box::new(MockedBoxes),
            vec![TrackedIdentity(1), TrackedIdentity(2)],
        );
        let objects = detector.detect(&frame()).unwrap();
        assert_eq!(objects[&TrackedIdentity(1)].center, (45, 90));
        assert_eq!(objects[&TrackedIdentity(2)].center, (75, 150));
        assert_eq!(objects[&TrackedIdentity(1)].rotation, 0.0);
    }

    #[test]
    fn composite_detector_merges_parts() {
        let mut fixed = Detections::new();
        fixed.insert(
            TrackedIdentity(3),
            LocalObservation {
                center: (1, 2),
                rotation: 0.5,
            },
        );
        let mut detector = CompositeDetector::new(vec![
            Box::new(FixedDetector::new(fixed)),
            Box::new(NeuralNetDetector::new(
                Box::new(MockedBoxes),
                vec![TrackedIdentity(4)],
            )),
        ]);
        let objects = detector.detect(&frame()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&TrackedIdentity(3)].center, (1, 2));
        assert_eq!(objects[&TrackedIdentity(4)].center, (45, 90));
    }
}
