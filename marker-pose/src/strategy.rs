//! # Completion strategies
//!
//! A completion strategy looks at a marker's buffered samples and decides whether they are
//! sufficient to produce a finalized pose. The active strategy is picked by
//! [`MarkerPositionBehavior`], and each variant has its own buffer capacity and acceptance
//! criteria.

use crate::outliers::Partition;
use crate::pose::{average_pose, FinalizedPose, MarkerId, PoseDeviation, PoseSample};
use crate::settings::{MarkerPositionBehavior, MarkerSettings};
use log::*;

/// Reason for refusing to finalize a full enough buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    /// Not enough samples survived outlier rejection.
    TooFewInliers { inliers: usize, required: usize },
    /// Inliers are spread out wider than allowed.
    TooSpread {
        deviation: PoseDeviation,
        limit: PoseDeviation,
    },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::TooFewInliers { inliers, required } => {
                write!(f, "{inliers} inliers, {required} required")
            }
            Self::TooSpread { deviation, limit } => write!(
                f,
                "deviation {:.5}m/{:.3}deg exceeds {:.5}m/{:.3}deg",
                deviation.position, deviation.rotation, limit.position, limit.rotation
            ),
        }
    }
}

/// Outcome of a single completion attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Completion {
    /// The samples produced a pose. The buffer should be reset.
    Completed(FinalizedPose),
    /// Not enough samples yet.
    Accumulating { have: usize, need: usize },
    /// Enough samples, but they do not agree well enough.
    Rejected(Rejection),
}

impl Completion {
    pub fn completed(self) -> Option<FinalizedPose> {
        match self {
            Self::Completed(pose) => Some(pose),
            _ => None,
        }
    }
}

impl MarkerPositionBehavior {
    /// Buffer capacity while this strategy is active.
    pub fn maximum_marker_sample_count(&self, settings: &MarkerSettings) -> usize {
        match self {
            Self::Stationary => settings.maximum_marker_sample_count,
            Self::Moving => settings.required_observations,
        }
    }

    /// Attempt finalizing a marker pose.
    ///
    /// # Arguments
    ///
    /// * `samples` - buffered samples of a single marker, oldest first.
    /// * `settings` - thresholds to evaluate against.
    pub fn try_complete_detection(
        &self,
        samples: &[PoseSample],
        settings: &MarkerSettings,
    ) -> Option<FinalizedPose> {
        self.evaluate(samples, settings).completed()
    }

    /// Attempt finalizing a marker pose, describing the outcome.
    ///
    /// This never modifies the samples. Rejections are logged, since they are a normal part of
    /// convergence.
    pub fn evaluate(&self, samples: &[PoseSample], settings: &MarkerSettings) -> Completion {
        let need = settings.required_observations.max(1);

        if samples.len() < need {
            return Completion::Accumulating {
                have: samples.len(),
                need,
            };
        }

        let completion = match self {
            Self::Stationary => stationary(samples, settings),
            Self::Moving => moving(samples),
        };

        if let Some(marker_id) = samples.first().map(|s| s.marker_id) {
            log_completion(marker_id, *self, &completion);
        }

        completion
    }
}

/// Plain average of the whole window.
///
/// A moving marker has no stable ground truth to test samples against, so every sample counts.
fn moving(samples: &[PoseSample]) -> Completion {
    match average_pose(samples) {
        Some(pose) => Completion::Completed(pose.into()),
        None => Completion::Accumulating { have: 0, need: 1 },
    }
}

/// Two-pass estimate: reject outliers around the raw average, then re-average the inliers and
/// require them to be tight.
fn stationary(samples: &[PoseSample], settings: &MarkerSettings) -> Completion {
    let average = match average_pose(samples) {
        Some(average) => average,
        None => return Completion::Accumulating { have: 0, need: 1 },
    };

    let Partition { inliers, .. } = Partition::new(
        samples,
        &average,
        settings.marker_inlier_standard_deviation_threshold,
    );

    let required = settings.required_inlier_count;

    let refined = match average_pose(&inliers) {
        Some(refined) if inliers.len() >= required => refined,
        _ => {
            return Completion::Rejected(Rejection::TooFewInliers {
                inliers: inliers.len(),
                required,
            })
        }
    };

    let deviation = PoseDeviation::about(&inliers, &refined);

    let limit = PoseDeviation {
        position: settings.maximum_position_distance_standard_deviation,
        rotation: settings.maximum_rotation_angle_standard_deviation,
    };

    if deviation.within(&limit) {
        Completion::Completed(refined.into())
    } else {
        Completion::Rejected(Rejection::TooSpread { deviation, limit })
    }
}

fn log_completion(marker_id: MarkerId, behavior: MarkerPositionBehavior, completion: &Completion) {
    match completion {
        Completion::Completed(pose) => debug!(
            "Marker {marker_id} finalized ({behavior}): {:?} {:?}",
            pose.position.coords.as_slice(),
            pose.rotation.euler_angles()
        ),
        Completion::Rejected(rejection) => {
            debug!("Marker {marker_id} rejected ({behavior}): {rejection}")
        }
        Completion::Accumulating { .. } => {}
    }
}
