//! Statistical outlier rejection.

use crate::pose::{position_distance, rotation_angle, PoseDeviation, PoseSample};

/// Result of splitting samples around their average.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    /// Samples within the threshold, in input order.
    pub inliers: Vec<PoseSample>,
    /// Rejected samples, in input order.
    pub outliers: Vec<PoseSample>,
    /// Spread of the full input about the average.
    pub deviation: PoseDeviation,
}

impl Partition {
    /// Partition samples into inliers and outliers.
    ///
    /// A sample is an inlier if both its distance and angle to `average` are below `threshold`
    /// multiples of the respective standard deviation. Zero distance (or angle) always passes its
    /// test, thus a perfectly uniform set keeps exact matches and rejects everything else.
    ///
    /// # Arguments
    ///
    /// * `samples` - samples of a single marker.
    /// * `average` - average pose of `samples`.
    /// * `threshold` - number of standard deviations a sample may be away from the average.
    pub fn new(samples: &[PoseSample], average: &PoseSample, threshold: f64) -> Self {
        let deviation = PoseDeviation::about(samples, average);

        let max_distance = threshold * deviation.position;
        let max_angle = threshold * deviation.rotation;

        let (inliers, outliers) = samples.iter().copied().partition(|s| {
            below(
                position_distance(&s.position, &average.position),
                max_distance,
            ) && below(rotation_angle(&s.rotation, &average.rotation), max_angle)
        });

        Self {
            inliers,
            outliers,
            deviation,
        }
    }
}

fn below(value: f64, limit: f64) -> bool {
    value < limit || value == 0.0
}
