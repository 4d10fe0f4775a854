//! Shared data model for the camera pipelines and the fusion stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of one video source (the device index it was opened from).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key for a real-world object of interest, correlated across
/// cameras.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TrackedIdentity(pub u32);

impl fmt::Display for TrackedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packed RGB8 image, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageBuffer {
    /// A black image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; (width * height * 3) as usize],
            width,
            height,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Writes one pixel; out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let offset = ((y as u32 * self.width + x as u32) * 3) as usize;
        self.data[offset..offset + 3].copy_from_slice(&rgb);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y * self.width + x) * 3) as usize;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }
}

/// One captured image plus metadata. Owned by a single pipeline stage at a
/// time; cloned, never aliased, when it crosses a stage boundary.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: ImageBuffer,
    pub timestamp_ns: u64,
    pub camera_id: CameraId,
}

impl Frame {
    pub fn new(image: ImageBuffer, camera_id: CameraId) -> Self {
        Self {
            image,
            timestamp_ns: now_nanos(),
            camera_id,
        }
    }
}

fn now_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Where one camera saw one identity, in its own pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalObservation {
    pub center: (i32, i32),
    pub rotation: f64,
}

/// Everything a detector found in one frame. An absent identity means "not
/// seen this frame", not "does not exist".
pub type Detections = HashMap<TrackedIdentity, LocalObservation>;

/// Per-frame, per-camera detection output flowing to the fusion sink.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub camera_id: CameraId,
    pub image: ImageBuffer,
    pub timestamp_ns: u64,
    pub objects: Detections,
}

/// A camera's position and orientation in the shared world frame, plus its
/// native image resolution. Replaced as a whole on reconfiguration so a
/// concurrent reader never sees a half-updated pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub resolution: (u32, u32),
}

/// Caller-supplied part of a camera pose; the resolution comes from the
/// device itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

impl CameraPose {
    pub fn new(placement: Placement, resolution: (u32, u32)) -> Self {
        Self {
            x: placement.x,
            y: placement.y,
            angle: placement.angle,
            resolution,
        }
    }
}

/// One identity's fused world-frame estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusedObject {
    pub center: (i32, i32),
    pub rotation: f64,
}
