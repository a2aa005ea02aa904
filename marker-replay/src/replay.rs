//! Detection replay loop.

use crate::source::PoseRecord;
use log::*;
use marker_pose::prelude::v1::*;
use std::io::Write;

/// Summary of a replay run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames: usize,
    pub detections: usize,
    pub finalized: usize,
}

/// Feed every frame of `source` through an aggregator and write out each finalized pose.
///
/// # Arguments
///
/// * `source` - recorded detections.
/// * `settings` - aggregator settings.
/// * `output` - CSV destination.
pub fn replay(
    mut source: impl DetectionSource,
    settings: MarkerSettings,
    output: impl Write,
) -> Result<ReplayStats> {
    let mut aggregator = ObservationAggregator::new(settings);
    let mut writer = csv::Writer::from_writer(output);
    let mut detections = vec![];
    let mut stats = ReplayStats::default();

    while source.next_detections(&mut detections)? {
        let frame = source.frame().unwrap_or(stats.frames);

        stats.frames += 1;
        stats.detections += detections.len();

        for pose in aggregator.process_detections(detections.drain(..)).values() {
            trace!("Frame {frame}: marker {} finalized", pose.marker_id);
            writer.serialize(PoseRecord::from_pose(frame, pose))?;
            stats.finalized += 1;
        }
    }

    writer.flush()?;

    Ok(stats)
}
