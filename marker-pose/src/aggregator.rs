//! # Observation aggregation
//!
//! The aggregator keeps a rolling buffer of samples for every marker it has seen, and asks the
//! active completion strategy to finalize each of them after every batch of detections.

use crate::pose::{FinalizedPose, MarkerId, PoseSample};
use crate::settings::{MarkerPositionBehavior, MarkerSettings};
use log::*;
use std::collections::BTreeMap;

/// Poses finalized during a single update.
///
/// Each batch supersedes the previous one. Markers missing from it keep whatever pose the caller
/// received last.
pub type MarkersUpdated = BTreeMap<MarkerId, FinalizedPose>;

/// Bounded, temporally ordered buffer of a single marker's samples.
#[derive(Clone, Debug, Default)]
pub struct ObservationBuffer {
    samples: Vec<PoseSample>,
    stale_cycles: usize,
}

impl ObservationBuffer {
    /// Append a sample, evicting the oldest ones so that at most `capacity` remain.
    ///
    /// Capacity is evaluated on every push, because it depends on the active strategy. Shrinking
    /// it evicts as many samples as needed.
    pub fn push(&mut self, sample: PoseSample, capacity: usize) {
        self.samples.push(sample);
        self.stale_cycles = 0;

        let capacity = capacity.max(1);

        if self.samples.len() > capacity {
            let excess = self.samples.len() - capacity;
            self.samples.drain(..excess);
        }
    }

    /// Drop all samples, keeping the allocation around.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.stale_cycles = 0;
    }

    /// Buffered samples, oldest first.
    pub fn samples(&self) -> &[PoseSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of consecutive updates in which this marker was not observed.
    pub fn stale_cycles(&self) -> usize {
        self.stale_cycles
    }
}

/// Per-marker sample accumulator.
///
/// This is not thread safe by itself - frame deliveries must be serialized before reaching it.
/// See [`MarkerWorker`](crate::worker::MarkerWorker) for a ready made queue.
#[derive(Clone, Debug, Default)]
pub struct ObservationAggregator {
    requested: MarkerSettings,
    settings: MarkerSettings,
    buffers: BTreeMap<MarkerId, ObservationBuffer>,
}

impl ObservationAggregator {
    /// Create a new aggregator.
    ///
    /// # Arguments
    ///
    /// * `settings` - initial settings. They are sanitized before use.
    pub fn new(settings: MarkerSettings) -> Self {
        Self {
            requested: settings,
            settings: settings.sanitized(),
            buffers: Default::default(),
        }
    }

    pub fn settings(&self) -> &MarkerSettings {
        &self.settings
    }

    /// Replace the settings.
    ///
    /// Buffers are left untouched. They get trimmed to the new capacity on their next sample.
    /// The requested settings are kept as given, and only sanitized again when they change.
    pub fn set_settings(&mut self, settings: MarkerSettings) {
        if settings == self.requested {
            return;
        }

        self.requested = settings;
        let settings = settings.sanitized();

        if settings != self.settings {
            debug!("Marker settings changed: {settings:?}");
        }

        self.settings = settings;
    }

    /// Switch the active completion strategy.
    pub fn set_behavior(&mut self, behavior: MarkerPositionBehavior) {
        self.set_settings(MarkerSettings {
            behavior,
            ..self.requested
        });
    }

    /// Get the buffer of a marker, if it has ever been observed.
    pub fn buffer(&self, marker_id: MarkerId) -> Option<&ObservationBuffer> {
        self.buffers.get(&marker_id)
    }

    /// Iterate all markers that have a buffer.
    pub fn marker_ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.buffers.keys().copied()
    }

    /// Forget every marker.
    pub fn reset(&mut self) {
        self.buffers.clear();
    }

    /// Process a single frame's worth of detections.
    ///
    /// Every detection is appended to its marker's buffer. Then completion is attempted for every
    /// marker that has samples, including the ones not observed in this frame. Markers that
    /// complete get their buffers cleared and their poses returned.
    ///
    /// # Arguments
    ///
    /// * `detections` - samples detected in the current frame.
    pub fn process_detections(
        &mut self,
        detections: impl IntoIterator<Item = PoseSample>,
    ) -> MarkersUpdated {
        let behavior = self.settings.behavior;
        let capacity = behavior.maximum_marker_sample_count(&self.settings);

        for buffer in self.buffers.values_mut() {
            buffer.stale_cycles += 1;
        }

        for sample in detections {
            self.buffers
                .entry(sample.marker_id)
                .or_default()
                .push(sample, capacity);
        }

        let stale_cycle_limit = self.settings.stale_cycle_limit;
        let mut updated = MarkersUpdated::new();

        for (&marker_id, buffer) in &mut self.buffers {
            if stale_cycle_limit > 0
                && buffer.stale_cycles > stale_cycle_limit
                && !buffer.is_empty()
            {
                debug!(
                    "Marker {marker_id} expired after {} unobserved updates",
                    buffer.stale_cycles
                );
                buffer.clear();
            }

            if buffer.is_empty() {
                continue;
            }

            if let Some(pose) = behavior.try_complete_detection(buffer.samples(), &self.settings) {
                updated.insert(marker_id, pose);
                buffer.clear();
            }
        }

        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use nalgebra as na;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn sample(marker_id: MarkerId, x: f64) -> PoseSample {
        PoseSample::new(
            marker_id,
            na::Point3::new(x, 1.0, -2.0),
            na::UnitQuaternion::from_euler_angles(0.3, -0.2, 0.1),
        )
    }

    fn nothing() -> std::iter::Empty<PoseSample> {
        std::iter::empty()
    }

    fn moving(required_observations: usize) -> MarkerSettings {
        MarkerSettings {
            behavior: MarkerPositionBehavior::Moving,
            required_observations,
            ..Default::default()
        }
    }

    /// Settings that never let the stationary strategy complete.
    fn never_completes(maximum_marker_sample_count: usize) -> MarkerSettings {
        MarkerSettings {
            behavior: MarkerPositionBehavior::Stationary,
            required_observations: maximum_marker_sample_count,
            required_inlier_count: maximum_marker_sample_count,
            maximum_marker_sample_count,
            maximum_position_distance_standard_deviation: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn moving_completes_on_fifth_sample() {
        let mut aggregator = ObservationAggregator::new(moving(5));

        for i in 0..4 {
            assert!(aggregator.process_detections([sample(1, i as f64)]).is_empty());
        }

        let updated = aggregator.process_detections([sample(1, 4.0)]);

        assert_eq!(updated.len(), 1);
        assert_approx_eq!(updated[&1].position.x, 2.0);
        assert_approx_eq!(updated[&1].position.y, 1.0);
        assert_approx_eq!(updated[&1].position.z, -2.0);
    }

    #[test]
    fn buffer_resets_on_success() {
        let mut aggregator = ObservationAggregator::new(moving(3));

        for i in 0..3 {
            aggregator.process_detections([sample(9, i as f64)]);
        }

        assert!(aggregator.buffer(9).unwrap().is_empty());

        // Fresh accumulation, independent of the history.
        assert!(aggregator.process_detections([sample(9, 10.0)]).is_empty());
        assert!(aggregator.process_detections([sample(9, 11.0)]).is_empty());

        let updated = aggregator.process_detections([sample(9, 12.0)]);
        assert_approx_eq!(updated[&9].position.x, 11.0);
    }

    #[test]
    fn fifo_eviction() {
        let capacity = 6;
        let mut aggregator = ObservationAggregator::new(never_completes(capacity));

        let samples = (0..capacity + 4)
            .map(|i| sample(3, i as f64 * 0.25))
            .collect::<Vec<_>>();

        for &s in &samples {
            assert!(aggregator.process_detections([s]).is_empty());
        }

        let buffer = aggregator.buffer(3).unwrap();

        assert_eq!(buffer.len(), capacity);
        assert_eq!(buffer.samples(), &samples[4..]);
    }

    #[test]
    fn failed_completion_keeps_buffer() {
        let mut aggregator = ObservationAggregator::new(never_completes(4));

        let samples = (0..4).map(|i| sample(5, i as f64)).collect::<Vec<_>>();
        aggregator.process_detections(samples.iter().copied());

        for _ in 0..10 {
            assert!(aggregator.process_detections(nothing()).is_empty());
            assert_eq!(aggregator.buffer(5).unwrap().samples(), &samples[..]);
        }
    }

    #[test]
    fn stale_buffers_are_retried() {
        let mut aggregator = ObservationAggregator::new(never_completes(3));

        for i in 0..3 {
            aggregator.process_detections([sample(2, i as f64)]);
        }

        // Loosen the settings, the marker is no longer observed but still completes.
        aggregator.set_settings(MarkerSettings {
            maximum_position_distance_standard_deviation: 1.0,
            marker_inlier_standard_deviation_threshold: 2.0,
            ..*aggregator.settings()
        });

        let updated = aggregator.process_detections(nothing());

        assert_approx_eq!(updated[&2].position.x, 1.0);
    }

    #[test]
    fn stale_buffers_expire() {
        let mut aggregator = ObservationAggregator::new(MarkerSettings {
            stale_cycle_limit: 2,
            ..never_completes(5)
        });

        aggregator.process_detections([sample(8, 0.0)]);
        aggregator.process_detections(nothing());
        aggregator.process_detections(nothing());
        assert_eq!(aggregator.buffer(8).unwrap().len(), 1);
        assert_eq!(aggregator.buffer(8).unwrap().stale_cycles(), 2);

        aggregator.process_detections(nothing());
        assert!(aggregator.buffer(8).unwrap().is_empty());
    }

    #[test]
    fn markers_are_independent() {
        let mut aggregator = ObservationAggregator::new(moving(2));

        assert!(aggregator
            .process_detections([sample(1, 0.0), sample(2, 5.0)])
            .is_empty());

        let updated = aggregator.process_detections([sample(1, 1.0)]);
        assert_eq!(updated.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(aggregator.buffer(2).unwrap().len(), 1);

        let updated = aggregator.process_detections([sample(2, 7.0), sample(3, 0.0)]);
        assert_eq!(updated.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_approx_eq!(updated[&2].position.x, 6.0);

        assert_eq!(aggregator.marker_ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn behavior_switch_keeps_buffers() {
        let mut aggregator = ObservationAggregator::new(MarkerSettings {
            required_observations: 3,
            ..never_completes(8)
        });

        for i in 0..6 {
            aggregator.process_detections([sample(4, i as f64)]);
        }
        assert_eq!(aggregator.buffer(4).unwrap().len(), 6);

        aggregator.set_behavior(MarkerPositionBehavior::Moving);
        assert_eq!(aggregator.buffer(4).unwrap().len(), 6);

        // Moving capacity is 3: the next sample trims the buffer to the latest three, which then
        // complete immediately.
        let updated = aggregator.process_detections([sample(4, 6.0)]);
        assert_approx_eq!(updated[&4].position.x, 5.0);
    }

    #[test]
    fn moving_window_larger_than_sample_count() {
        let mut aggregator = ObservationAggregator::new(MarkerSettings {
            maximum_marker_sample_count: 30,
            ..moving(50)
        });

        let completed_at = (1..=60).find(|&i| {
            !aggregator
                .process_detections([sample(6, i as f64)])
                .is_empty()
        });

        assert_eq!(completed_at, Some(50));
    }

    #[test]
    fn behavior_round_trip_keeps_window() {
        let mut aggregator = ObservationAggregator::new(MarkerSettings {
            maximum_marker_sample_count: 30,
            ..moving(50)
        });

        aggregator.set_behavior(MarkerPositionBehavior::Stationary);
        assert_eq!(aggregator.settings().required_observations, 30);

        aggregator.set_behavior(MarkerPositionBehavior::Moving);
        assert_eq!(aggregator.settings().required_observations, 50);
    }

    #[test]
    fn stationary_converges_despite_misdetections() {
        let truth = na::Point3::new(0.4, -0.1, 1.2);
        let truth_rot = na::UnitQuaternion::from_euler_angles(0.2, 0.5, -0.3);

        let mut aggregator = ObservationAggregator::new(MarkerSettings {
            behavior: MarkerPositionBehavior::Stationary,
            required_observations: 15,
            required_inlier_count: 12,
            maximum_marker_sample_count: 30,
            maximum_position_distance_standard_deviation: 0.003,
            maximum_rotation_angle_standard_deviation: 1.0,
            marker_inlier_standard_deviation_threshold: 1.5,
            stale_cycle_limit: 0,
        });

        let mut rng = StdRng::seed_from_u64(0x6d61726b);
        let mut result = None;

        for frame in 0..200 {
            let sample = if frame % 7 == 3 {
                // Gross misdetection.
                PoseSample::new(
                    11,
                    truth + na::Vector3::new(0.5, rng.gen_range(-0.5..0.5), 0.2),
                    truth_rot
                        * na::UnitQuaternion::from_euler_angles(rng.gen_range(-1.0..1.0), 0.0, 0.0),
                )
            } else {
                let noise = na::Vector3::new(
                    rng.gen_range(-0.002..0.002),
                    rng.gen_range(-0.002..0.002),
                    rng.gen_range(-0.002..0.002),
                );
                let rot_noise = na::UnitQuaternion::from_euler_angles(
                    rng.gen_range(-0.005..0.005),
                    rng.gen_range(-0.005..0.005),
                    rng.gen_range(-0.005..0.005),
                );
                PoseSample::new(11, truth + noise, truth_rot * rot_noise)
            };

            if let Some(pose) = aggregator.process_detections([sample]).remove(&11) {
                result = Some(pose);
                break;
            }
        }

        let pose = result.expect("marker never converged");

        assert!(na::distance(&pose.position, &truth) < 0.002);
        assert!(pose.rotation.angle_to(&truth_rot).to_degrees() < 0.5);
    }
}
