//! # Detection sources

use crate::pose::PoseSample;
use anyhow::Result;

/// Producer of per-frame marker detections.
///
/// Implementations wrap a camera and a marker detector, or a recording of their output. Poses must
/// already be expressed in a consistent reference frame.
pub trait DetectionSource {
    /// Process a single frame in the stream.
    ///
    /// This function will take in a single frame, and append every marker detected in it to
    /// `detections`. If a frame was processed, `Ok(true)` is returned, even if no markers were
    /// found. When the stream ends, `Ok(false)` is returned, and if there is an error while
    /// processing, `Err` is returned.
    fn next_detections(&mut self, detections: &mut Vec<PoseSample>) -> Result<bool>;

    /// Index of the last processed frame, if known.
    fn frame(&self) -> Option<usize> {
        None
    }
}

impl<T: DetectionSource + ?Sized> DetectionSource for Box<T> {
    fn next_detections(&mut self, detections: &mut Vec<PoseSample>) -> Result<bool> {
        (**self).next_detections(detections)
    }

    fn frame(&self) -> Option<usize> {
        (**self).frame()
    }
}
