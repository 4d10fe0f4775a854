//! Threaded data pipeline framework.
//!
//! A pipeline is assembled from a polled [`Poll`] source driven by a
//! [`SourceDriver`] or [`PeriodicDriver`], a [`Worker`] applying a
//! [`Transform`] chain, and a [`SinkDriver`] feeding a terminal [`Consume`]
//! implementation. Stages communicate over flume channels and each runs on
//! its own thread; `stop()` on any stage is cooperative and returns only
//! after in-flight work has drained.

pub mod chain;
pub mod sink;
pub mod source;
pub mod worker;

mod handle;

pub use chain::{Identity, Then, Transform, TransformError};
pub use sink::{Consume, InputSet, SinkDriver};
pub use source::{PeriodicDriver, Poll, SourceDriver};
pub use worker::Worker;
