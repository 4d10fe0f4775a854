//! Multi-camera detection fusion.
//!
//! Each camera runs its own acquisition-and-detection pipeline; the
//! [`registry::CameraRegistry`] owns the set of live cameras and supports
//! runtime membership changes, and the [`fusion::FusionSink`] folds every
//! camera's local detections into one shared world coordinate frame.

pub mod camera;
pub mod config;
pub mod detect;
pub mod device;
pub mod frame;
pub mod fusion;
pub mod notify;
pub mod registry;
pub mod transforms;
