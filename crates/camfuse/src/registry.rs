//! Camera registry: owns every live camera and supports runtime membership
//! changes without disturbing the others.

use crate::camera::{Camera, CameraStatus};
use crate::detect::DetectorFactory;
use crate::device::{DeviceError, DeviceManager};
use crate::frame::{CameraId, CameraPose, DetectionResult, Placement};
use camfuse_pipeline::InputSet;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("camera {0} not found")]
    NotFound(CameraId),

    #[error("camera {0} already registered")]
    AlreadyRegistered(CameraId),

    #[error("invalid camera configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Poses of every registered camera, shared with the fusion sink. Entries
/// are replaced whole under the write lock, so a concurrent reader observes
/// either the fully-old or the fully-new pose.
pub type PoseTable = Arc<RwLock<HashMap<CameraId, CameraPose>>>;

pub fn new_pose_table() -> PoseTable {
    Arc::new(RwLock::new(HashMap::new()))
}

/// One row of the camera listing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CameraState {
    pub id: CameraId,
    pub rate_hz: f64,
    pub status: CameraStatus,
    pub pose: CameraPose,
}

/// A probed device index not currently registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeDevice {
    pub index: u32,
    pub resolution: (u32, u32),
}

pub struct CameraRegistry {
    cameras: HashMap<CameraId, Camera>,
    devices: Arc<dyn DeviceManager>,
    detectors: Arc<dyn DetectorFactory>,
    fusion_inputs: InputSet<DetectionResult>,
    poses: PoseTable,
    max_probe_index: u32,
}

impl CameraRegistry {
    pub fn new(
        devices: Arc<dyn DeviceManager>,
        detectors: Arc<dyn DetectorFactory>,
        fusion_inputs: InputSet<DetectionResult>,
        poses: PoseTable,
        max_probe_index: u32,
    ) -> Self {
        Self {
            cameras: HashMap::new(),
            devices,
            detectors,
            fusion_inputs,
            poses,
            max_probe_index,
        }
    }

    /// Registers a new inactive camera: opens its device, wires a fresh
    /// output channel into the fusion input set and records its pose.
    pub fn add(&mut self, id: CameraId, placement: Placement, rate_hz: f64) -> Result<()> {
        if self.cameras.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        validate_rate(rate_hz)?;
        let grabber = self.devices.open(id.0)?;
        let resolution = grabber.resolution();

        let (output_tx, output_rx) = flume::unbounded();
        self.fusion_inputs.insert(u64::from(id.0), output_rx);
        self.write_poses()
            .insert(id, CameraPose::new(placement, resolution));
        self.cameras.insert(
            id,
            Camera::new(id, rate_hz, grabber, Arc::clone(&self.detectors), output_tx),
        );
        log::info!("camera {} registered at ({}, {})", id, placement.x, placement.y);
        Ok(())
    }

    /// Stops the camera synchronously, then evicts it and unwires its
    /// output channel. After this returns no thread of the removed camera
    /// is left running.
    pub fn remove(&mut self, id: CameraId) -> Result<()> {
        let mut camera = self
            .cameras
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        camera.stop();
        self.fusion_inputs.remove(u64::from(id.0));
        self.write_poses().remove(&id);
        log::info!("camera {} removed", id);
        Ok(())
    }

    pub fn start(&mut self, id: CameraId) -> Result<()> {
        self.cameras
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?
            .start();
        Ok(())
    }

    pub fn stop(&mut self, id: CameraId) -> Result<()> {
        self.cameras
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?
            .stop();
        Ok(())
    }

    /// Replaces the camera's pose and rate without restarting acquisition.
    /// The pose entry is swapped whole; the native resolution is kept.
    pub fn update(&mut self, id: CameraId, placement: Placement, rate_hz: f64) -> Result<()> {
        let camera = self
            .cameras
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        validate_rate(rate_hz)?;
        {
            let mut poses = self.poses.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = poses.get_mut(&id) {
                *entry = CameraPose::new(placement, entry.resolution);
            }
        }
        camera.set_rate(rate_hz);
        Ok(())
    }

    /// Snapshot of every registered camera.
    pub fn list(&self) -> Vec<CameraState> {
        let poses = self.poses.read().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<CameraState> = self
            .cameras
            .values()
            .filter_map(|camera| {
                let pose = poses.get(&camera.id())?;
                Some(CameraState {
                    id: camera.id(),
                    rate_hz: camera.rate_hz(),
                    status: camera.status(),
                    pose: *pose,
                })
            })
            .collect();
        states.sort_by_key(|state| state.id);
        states
    }

    /// Probes device indices up to the configured bound and reports the
    /// ones present but not registered, with their native resolutions.
    pub fn free_devices(&self) -> Vec<FreeDevice> {
        (0..self.max_probe_index)
            .filter(|index| !self.cameras.contains_key(&CameraId(*index)))
            .filter(|index| self.devices.is_present(*index))
            .map(|index| FreeDevice {
                index,
                resolution: self.devices.native_resolution(index).unwrap_or((0, 0)),
            })
            .collect()
    }

    /// Stops every camera; used at shutdown.
    pub fn stop_all(&mut self) {
        for camera in self.cameras.values_mut() {
            camera.stop();
        }
    }

    fn write_poses(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<CameraId, CameraPose>> {
        self.poses.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_rate(rate_hz: f64) -> Result<()> {
    if rate_hz.is_finite() && rate_hz > 0.0 {
        Ok(())
    } else {
        Err(RegistryError::Config(format!(
            "acquisition rate must be positive, got {rate_hz}"
        )))
    }
}
