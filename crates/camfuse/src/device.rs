//! Device seam.
//!
//! The real capture driver is an external collaborator; this module defines
//! the interface the pipeline needs from it, plus a synthetic test-pattern
//! backend used by the tests and the default daemon profile.

use crate::frame::ImageBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {0} cannot be opened")]
    OpenFailed(u32),
}

/// An opened capture device.
pub trait FrameGrabber: Send {
    /// Returns the next captured image, or `None` if the device has nothing
    /// ready this call.
    fn read(&mut self) -> Option<ImageBuffer>;

    fn resolution(&self) -> (u32, u32);
}

/// Opens devices by index and probes which indices exist.
pub trait DeviceManager: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn FrameGrabber>, DeviceError>;

    fn is_present(&self, index: u32) -> bool;

    fn native_resolution(&self, index: u32) -> Option<(u32, u32)>;
}

/// Backend exposing `device_count` synthetic devices, each producing a
/// moving test pattern.
pub struct SyntheticDeviceManager {
    device_count: u32,
    resolution: (u32, u32),
}

impl SyntheticDeviceManager {
    pub fn new(device_count: u32, resolution: (u32, u32)) -> Self {
        Self {
            device_count,
            resolution,
        }
    }
}

impl DeviceManager for SyntheticDeviceManager {
    fn open(&self, index: u32) -> Result<Box<dyn FrameGrabber>, DeviceError> {
        if index >= self.device_count {
            return Err(DeviceError::OpenFailed(index));
        }
        Ok(Box::new(SyntheticGrabber {
            resolution: self.resolution,
            tick: 0,
        }))
    }

    fn is_present(&self, index: u32) -> bool {
        index < self.device_count
    }

    fn native_resolution(&self, index: u32) -> Option<(u32, u32)> {
        self.is_present(index).then_some(self.resolution)
    }
}

/// Produces a white square sweeping across a black background.
pub struct SyntheticGrabber {
    resolution: (u32, u32),
    tick: u64,
}

impl FrameGrabber for SyntheticGrabber {
    fn read(&mut self) -> Option<ImageBuffer> {
        let (width, height) = self.resolution;
        let mut image = ImageBuffer::new(width, height);
        let x = ((self.tick * 4) % width.max(1) as u64) as i32;
        let y = (height / 2) as i32;
        for dx in -2..=2 {
            for dy in -2..=2 {
                image.set_pixel(x + dx, y + dy, [255, 255, 255]);
            }
        }
        self.tick += 1;
        Some(image)
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
