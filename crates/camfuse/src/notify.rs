//! Notification seam.
//!
//! Delivery (mail, webhook, ...) is an external collaborator. Implementations
//! must be fire-and-forget: never block the caller for long and never let a
//! delivery failure propagate back into the pipeline.

use crate::frame::{CameraId, Frame};

pub trait Notify: Send + Sync {
    fn notify(&self, camera: CameraId, frame: &Frame);
}

/// Notifier that only writes a log line.
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, camera: CameraId, frame: &Frame) {
        log::info!(
            "suspicious activity on camera {} ({}x{} frame attached)",
            camera,
            frame.image.width,
            frame.image.height
        );
    }
}
