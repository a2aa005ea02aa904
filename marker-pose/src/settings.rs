//! # Marker consolidation settings

use crate::properties::{Properties, PropertyMut};
use anyhow::{anyhow, Error};
use log::*;
use std::str::FromStr;

/// How markers are expected to behave in the world.
///
/// This selects the completion strategy. Switching it carries no state over - buffered samples
/// simply get evaluated by the newly selected strategy on the next update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MarkerPositionBehavior {
    /// Marker is fixed in the world, produce a single high confidence pose.
    Stationary,
    /// Marker moves every frame, produce a continuously smoothed pose.
    Moving,
}

impl Default for MarkerPositionBehavior {
    fn default() -> Self {
        Self::Stationary
    }
}

impl FromStr for MarkerPositionBehavior {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stationary" => Ok(Self::Stationary),
            "moving" => Ok(Self::Moving),
            _ => Err(anyhow!("Invalid marker behavior: {s}")),
        }
    }
}

impl std::fmt::Display for MarkerPositionBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Stationary => write!(f, "stationary"),
            Self::Moving => write!(f, "moving"),
        }
    }
}

/// Tunable knobs read by the completion strategies.
///
/// None of the strategies mutate these. Counts are in samples, distances in metres and angles in
/// degrees.
///
/// Every knob has an upper bound (see the `MAX_*` constants), and counts are at least 1.
/// [`MarkerSettings::sanitized`] clamps out of range values and logs a warning for each of them.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarkerSettings {
    /// Active completion strategy.
    pub behavior: MarkerPositionBehavior,
    /// Minimum number of buffered samples before completion is attempted.
    ///
    /// In moving mode this is also the averaging window size.
    pub required_observations: usize,
    /// Minimum number of samples that must survive outlier rejection (stationary only).
    pub required_inlier_count: usize,
    /// Rolling buffer capacity (stationary only).
    pub maximum_marker_sample_count: usize,
    /// Largest accepted positional spread of the inliers (stationary only).
    pub maximum_position_distance_standard_deviation: f64,
    /// Largest accepted angular spread of the inliers (stationary only).
    pub maximum_rotation_angle_standard_deviation: f64,
    /// Number of standard deviations separating inliers from outliers (stationary only).
    pub marker_inlier_standard_deviation_threshold: f64,
    /// Clear a marker's buffer after this many consecutive updates without observing it.
    ///
    /// Zero keeps stale buffers around indefinitely.
    pub stale_cycle_limit: usize,
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            behavior: Default::default(),
            required_observations: 10,
            required_inlier_count: 8,
            maximum_marker_sample_count: 30,
            maximum_position_distance_standard_deviation: 0.002,
            maximum_rotation_angle_standard_deviation: 0.75,
            marker_inlier_standard_deviation_threshold: 1.5,
            stale_cycle_limit: 0,
        }
    }
}

/// Upper bound of every sample count.
pub const MAX_SAMPLE_COUNT: usize = 1000;
/// Upper bound of the positional spread, in metres.
pub const MAX_POSITION_DEVIATION: f64 = 1.0;
/// Upper bound of the angular spread, in degrees. No two rotations are further apart.
pub const MAX_ROTATION_DEVIATION: f64 = 180.0;
/// Upper bound of the inlier threshold, in standard deviations.
pub const MAX_INLIER_THRESHOLD: f64 = 10.0;
/// Upper bound of the stale cycle limit.
pub const MAX_STALE_CYCLES: usize = 10000;

impl MarkerSettings {
    /// Copy of the settings with every knob clamped to its valid range.
    ///
    /// Sample counts are kept at least 1 and the inlier requirement never exceeds the buffer
    /// capacity. The stationary strategy also caps the observation requirement at the buffer
    /// capacity, otherwise it could never complete. The moving window is its own buffer capacity,
    /// so it is left alone. Every adjusted knob is logged as a warning.
    pub fn sanitized(self) -> Self {
        let mut sanitized = self;
        sanitized.props_mut().iter_mut().for_each(|(_, p)| p.clamp());

        let max = sanitized.maximum_marker_sample_count;
        sanitized.required_inlier_count = sanitized.required_inlier_count.min(max);

        if sanitized.behavior == MarkerPositionBehavior::Stationary {
            sanitized.required_observations = sanitized.required_observations.min(max);
        }

        let (mut requested, mut adjusted) = (self, sanitized);

        for ((name, old), (_, new)) in requested.props().into_iter().zip(adjusted.props()) {
            if old != new {
                warn!("{name} adjusted from {old} to {new}");
            }
        }

        sanitized
    }
}

impl Properties for MarkerSettings {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            ("Behavior", PropertyMut::behavior(&mut self.behavior)),
            (
                "Required observations",
                PropertyMut::usize(&mut self.required_observations, 1, MAX_SAMPLE_COUNT),
            ),
            (
                "Required inliers",
                PropertyMut::usize(&mut self.required_inlier_count, 1, MAX_SAMPLE_COUNT),
            ),
            (
                "Max samples",
                PropertyMut::usize(&mut self.maximum_marker_sample_count, 1, MAX_SAMPLE_COUNT),
            ),
            (
                "Max position deviation",
                PropertyMut::float(
                    &mut self.maximum_position_distance_standard_deviation,
                    0.0,
                    MAX_POSITION_DEVIATION,
                ),
            ),
            (
                "Max rotation deviation",
                PropertyMut::float(
                    &mut self.maximum_rotation_angle_standard_deviation,
                    0.0,
                    MAX_ROTATION_DEVIATION,
                ),
            ),
            (
                "Inlier threshold",
                PropertyMut::float(
                    &mut self.marker_inlier_standard_deviation_threshold,
                    0.0,
                    MAX_INLIER_THRESHOLD,
                ),
            ),
            (
                "Stale cycle limit",
                PropertyMut::usize(&mut self.stale_cycle_limit, 0, MAX_STALE_CYCLES),
            ),
        ]
    }
}
