//! # Pose samples and averaging primitives

use nalgebra as na;

/// Identifier of a physical marker, stable across frames.
pub type MarkerId = i32;

/// Single raw marker observation.
///
/// The position is in metres, expressed in the reference frame established by the detector. The
/// core never transforms between frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseSample {
    pub marker_id: MarkerId,
    pub position: na::Point3<f64>,
    pub rotation: na::UnitQuaternion<f64>,
}

impl PoseSample {
    pub fn new(
        marker_id: MarkerId,
        position: na::Point3<f64>,
        rotation: na::UnitQuaternion<f64>,
    ) -> Self {
        Self {
            marker_id,
            position,
            rotation,
        }
    }
}

/// Consolidated marker pose, emitted once per successful completion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FinalizedPose {
    pub marker_id: MarkerId,
    pub position: na::Point3<f64>,
    pub rotation: na::UnitQuaternion<f64>,
}

impl From<PoseSample> for FinalizedPose {
    fn from(
        PoseSample {
            marker_id,
            position,
            rotation,
        }: PoseSample,
    ) -> Self {
        Self {
            marker_id,
            position,
            rotation,
        }
    }
}

/// Average a set of samples of a single marker.
///
/// Positions are averaged arithmetically. Rotations are averaged by sequential weighted slerp:
/// starting from the first rotation, the `i`-th rotation is blended in with weight `1 / (i + 1)`.
///
/// # Remarks
///
/// The rotation result depends on the input order and is only an approximation of the geodesic
/// (Karcher) mean. It is accurate for tightly clustered rotations, which is the regime marker
/// samples live in. Thresholds in [`MarkerSettings`](crate::settings::MarkerSettings) are tuned
/// against this approximation.
///
/// The caller must ensure all samples share the same marker id. The id of the first sample is
/// returned. `None` is returned for an empty slice.
///
/// # Examples
///
/// ```
/// # use assert_approx_eq::assert_approx_eq;
/// use marker_pose::pose::{average_pose, PoseSample};
/// use nalgebra as na;
///
/// let samples = [
///     PoseSample::new(1, na::Point3::new(0.0, 0.0, 1.0), na::UnitQuaternion::identity()),
///     PoseSample::new(1, na::Point3::new(0.0, 0.0, 3.0), na::UnitQuaternion::identity()),
/// ];
///
/// let average = average_pose(&samples).unwrap();
///
/// assert_approx_eq!(average.position.z, 2.0);
/// ```
pub fn average_pose(samples: &[PoseSample]) -> Option<PoseSample> {
    let first = samples.first()?;

    let position = samples
        .iter()
        .fold(na::Vector3::zeros(), |acc, s| acc + s.position.coords)
        / samples.len() as f64;

    let rotation = samples
        .iter()
        .enumerate()
        .skip(1)
        .fold(first.rotation, |mean, (i, s)| {
            blend_rotation(mean, s.rotation, 1.0 / (i + 1) as f64)
        });

    Some(PoseSample::new(first.marker_id, position.into(), rotation))
}

/// Slerp `mean` towards `other` by `t`, taking the shortest path.
fn blend_rotation(
    mean: na::UnitQuaternion<f64>,
    other: na::UnitQuaternion<f64>,
    t: f64,
) -> na::UnitQuaternion<f64> {
    if mean == other {
        return mean;
    }

    // Slerp is undefined for (nearly) coincident inputs, in which case there is nothing to blend.
    mean.try_slerp(&other, t, f64::EPSILON).unwrap_or(mean)
}

/// Euclidean distance between two positions, in metres.
pub fn position_distance(a: &na::Point3<f64>, b: &na::Point3<f64>) -> f64 {
    na::distance(a, b)
}

/// Shortest-arc angle between two rotations, in degrees.
///
/// Computed through `atan2`, so that identical rotations measure exactly zero.
pub fn rotation_angle(a: &na::UnitQuaternion<f64>, b: &na::UnitQuaternion<f64>) -> f64 {
    if a == b {
        return 0.0;
    }

    let delta = a.rotation_to(b);
    let half = delta.imag().norm().atan2(delta.scalar().abs());
    (half * 2.0).to_degrees()
}

/// Spread of a sample set about a reference pose.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseDeviation {
    /// Positional standard deviation, in metres.
    pub position: f64,
    /// Angular standard deviation, in degrees.
    pub rotation: f64,
}

impl PoseDeviation {
    /// Compute population standard deviation of samples about a reference pose.
    ///
    /// Each sample contributes its distance (and angle) to the reference, so the result is the
    /// root-mean-square of these, divided by `n` rather than `n - 1`. Empty input has zero spread.
    ///
    /// # Arguments
    ///
    /// * `samples` - poses to measure.
    /// * `reference` - pose the distances are measured against, usually the samples' average.
    pub fn about(samples: &[PoseSample], reference: &PoseSample) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let (position, rotation) = samples.iter().fold((0.0, 0.0), |(p, r), s| {
            let d = position_distance(&s.position, &reference.position);
            let a = rotation_angle(&s.rotation, &reference.rotation);
            (p + d * d, r + a * a)
        });

        let n = samples.len() as f64;

        Self {
            position: (position / n).sqrt(),
            rotation: (rotation / n).sqrt(),
        }
    }

    /// Check whether both components are within the given limit.
    pub fn within(&self, limit: &PoseDeviation) -> bool {
        self.position <= limit.position && self.rotation <= limit.rotation
    }
}
