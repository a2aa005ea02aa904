//! # Marker Pose Consolidation Library
//!
//! This library turns a noisy, time-ordered stream of single-frame fiducial marker detections
//! into stable marker poses. Detections are accumulated per marker, and a completion strategy
//! decides on every update whether there is enough evidence to emit a finalized pose.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use marker_pose::prelude::v1::*;
//! ```
//!
//! You may need [`nalgebra`](https://crates.io/crates/nalgebra) to make use of the functionality.
//!
//! ```
//! use marker_pose::prelude::v1::*;
//! use nalgebra as na;
//!
//! let settings = MarkerSettings {
//!     behavior: MarkerPositionBehavior::Moving,
//!     required_observations: 2,
//!     ..Default::default()
//! };
//!
//! let mut aggregator = ObservationAggregator::new(settings);
//!
//! let sample = |x| {
//!     PoseSample::new(3, na::Point3::new(x, 0.0, 0.0), na::UnitQuaternion::identity())
//! };
//!
//! assert!(aggregator.process_detections([sample(1.0)]).is_empty());
//!
//! let updated = aggregator.process_detections([sample(2.0)]);
//! assert_eq!(updated[&3].position.x, 1.5);
//! ```

pub mod aggregator;
pub mod outliers;
pub mod pose;
pub mod properties;
pub mod settings;
pub mod source;
pub mod strategy;
pub mod worker;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            aggregator::{MarkersUpdated, ObservationAggregator, ObservationBuffer},
            outliers::Partition,
            pose::{average_pose, FinalizedPose, MarkerId, PoseDeviation, PoseSample},
            properties::{Properties, Property, PropertyMut},
            settings::{MarkerPositionBehavior, MarkerSettings},
            source::DetectionSource,
            strategy::{Completion, Rejection},
            worker::MarkerWorker,
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
