//! Cross-camera fusion.
//!
//! Converts each camera's local detections into world coordinates using the
//! camera's pose and folds every camera's most recent contribution into one
//! estimate per tracked identity.

use crate::frame::{
    CameraId, CameraPose, DetectionResult, Frame, FusedObject, ImageBuffer, LocalObservation,
    TrackedIdentity,
};
use crate::notify::Notify;
use crate::registry::PoseTable;
use camfuse_pipeline::Consume;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

/// A single identity observation after the local-to-world transform.
#[derive(Debug, Clone, Copy)]
struct WorldObservation {
    x: f64,
    y: f64,
    rotation: f64,
}

/// The latest fused world estimate, shared with whatever renders or serves
/// it.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorldSnapshot {
    pub objects: HashMap<TrackedIdentity, FusedObject>,
}

/// Handle to the fused output; cloned into the fusion sink and every
/// reader.
#[derive(Clone, Default)]
pub struct WorldState {
    inner: Arc<RwLock<WorldSnapshot>>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, snapshot: WorldSnapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Terminal stage of every camera pipeline.
///
/// Per consumed batch: transforms each camera's detections into the world
/// frame, keeps that camera's result as its current contribution
/// (last-value-wins until superseded), then averages each configured
/// identity across all contributing cameras and publishes the fused map.
pub struct FusionSink {
    poses: PoseTable,
    identities: Vec<TrackedIdentity>,
    world: WorldState,
    notifier: Option<Arc<dyn Notify>>,
    contributions: HashMap<CameraId, HashMap<TrackedIdentity, WorldObservation>>,
    previously_fused: HashSet<TrackedIdentity>,
}

impl FusionSink {
    pub fn new(
        poses: PoseTable,
        identities: Vec<TrackedIdentity>,
        world: WorldState,
        notifier: Option<Arc<dyn Notify>>,
    ) -> Self {
        Self {
            poses,
            identities,
            world,
            notifier,
            contributions: HashMap::new(),
            previously_fused: HashSet::new(),
        }
    }

    fn fuse(&self) -> HashMap<TrackedIdentity, FusedObject> {
        let mut objects = HashMap::new();
        for &identity in &self.identities {
            let mut count = 0u32;
            let (mut sum_x, mut sum_y, mut sum_rotation) = (0.0f64, 0.0f64, 0.0f64);
            for contribution in self.contributions.values() {
                if let Some(observation) = contribution.get(&identity) {
                    sum_x += observation.x;
                    sum_y += observation.y;
                    sum_rotation += observation.rotation;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }
            let n = f64::from(count);
            // TODO: average rotations on the unit circle; the arithmetic
            // mean misbehaves near the wrap boundary (359 deg and 1 deg
            // average to 180 deg).
            objects.insert(
                identity,
                FusedObject {
                    center: ((sum_x / n) as i32, (sum_y / n) as i32),
                    rotation: sum_rotation / n,
                },
            );
        }
        objects
    }

    fn raise_notifications(
        &self,
        fused: &HashMap<TrackedIdentity, FusedObject>,
        reporters: &HashMap<TrackedIdentity, CameraId>,
        images: &HashMap<CameraId, (ImageBuffer, u64)>,
    ) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for identity in fused.keys() {
            if self.previously_fused.contains(identity) {
                continue;
            }
            let Some(&camera_id) = reporters.get(identity) else {
                continue;
            };
            let Some((image, timestamp_ns)) = images.get(&camera_id) else {
                continue;
            };
            log::debug!("identity {identity} appeared, notifying for camera {camera_id}");
            notifier.notify(
                camera_id,
                &Frame {
                    image: image.clone(),
                    timestamp_ns: *timestamp_ns,
                    camera_id,
                },
            );
        }
    }
}

impl Consume for FusionSink {
    type Item = DetectionResult;

    fn consume(&mut self, batch: Vec<DetectionResult>) {
        let poses = self
            .poses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut reporters: HashMap<TrackedIdentity, CameraId> = HashMap::new();
        let mut images: HashMap<CameraId, (ImageBuffer, u64)> = HashMap::new();

        for result in batch {
            let Some(pose) = poses.get(&result.camera_id) else {
                // The camera was evicted between publish and consume.
                log::debug!("dropping result from unknown camera {}", result.camera_id);
                continue;
            };
            let transformed: HashMap<TrackedIdentity, WorldObservation> = result
                .objects
                .iter()
                .map(|(&identity, observation)| {
                    reporters.insert(identity, result.camera_id);
                    (identity, to_world(observation, pose))
                })
                .collect();
            self.contributions.insert(result.camera_id, transformed);
            images.insert(result.camera_id, (result.image, result.timestamp_ns));
        }

        let fused = self.fuse();
        self.raise_notifications(&fused, &reporters, &images);
        self.previously_fused = fused.keys().copied().collect();
        log::debug!("fused {} identities", fused.len());
        self.world.publish(WorldSnapshot { objects: fused });
    }
}

fn to_world(observation: &LocalObservation, pose: &CameraPose) -> WorldObservation {
    let (sin, cos) = pose.angle.sin_cos();
    let lx = f64::from(observation.center.0);
    let ly = f64::from(observation.center.1);
    WorldObservation {
        x: pose.x + lx * cos - ly * sin,
        y: pose.y + lx * sin + ly * cos,
        rotation: observation.rotation + pose.angle,
    }
}
