//! Recorded detection streams.

use log::*;
use marker_pose::prelude::v1::*;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::net::{TcpListener, TcpStream};

/// Single marker pose, as stored in recordings and in the replay output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    pub frame: usize,
    pub marker_id: MarkerId,
    pub pos_x: f64,
    pub pos_y: f64,
    pub pos_z: f64,
    pub rot_w: f64,
    pub rot_i: f64,
    pub rot_j: f64,
    pub rot_k: f64,
}

impl PoseRecord {
    pub fn new(
        frame: usize,
        marker_id: MarkerId,
        position: na::Point3<f64>,
        rotation: na::UnitQuaternion<f64>,
    ) -> Self {
        let q = rotation.quaternion();
        Self {
            frame,
            marker_id,
            pos_x: position.x,
            pos_y: position.y,
            pos_z: position.z,
            rot_w: q.w,
            rot_i: q.i,
            rot_j: q.j,
            rot_k: q.k,
        }
    }

    pub fn from_pose(frame: usize, pose: &FinalizedPose) -> Self {
        Self::new(frame, pose.marker_id, pose.position, pose.rotation)
    }

    /// Convert the record into a detection.
    ///
    /// Fails on non-finite values and on rotations that can not be normalized.
    pub fn sample(&self) -> Result<PoseSample> {
        let position = na::Point3::new(self.pos_x, self.pos_y, self.pos_z);
        let rotation = na::Quaternion::new(self.rot_w, self.rot_i, self.rot_j, self.rot_k);

        if !position.coords.iter().all(|v| v.is_finite()) {
            return Err(anyhow!(
                "Frame {} marker {}: invalid position {:?}",
                self.frame,
                self.marker_id,
                position.coords.as_slice()
            ));
        }

        let rotation = Some(rotation)
            .filter(|q| q.coords.iter().all(|v| v.is_finite()))
            .and_then(|q| na::UnitQuaternion::try_new(q, f64::EPSILON))
            .ok_or_else(|| {
                anyhow!(
                    "Frame {} marker {}: invalid rotation {:?}",
                    self.frame,
                    self.marker_id,
                    rotation.coords.as_slice()
                )
            })?;

        Ok(PoseSample::new(self.marker_id, position, rotation))
    }
}

/// Detection source reading CSV recordings.
///
/// Consecutive rows sharing a frame number form a single frame. Frames skipped in the numbering
/// are replayed as frames without any detections.
pub struct CsvDetections<R> {
    records: csv::DeserializeRecordsIntoIter<R, PoseRecord>,
    pending: Option<PoseRecord>,
    frame: Option<usize>,
}

impl<R: Read> CsvDetections<R> {
    pub fn new(reader: R) -> Self {
        Self {
            records: csv::Reader::from_reader(reader).into_deserialize(),
            pending: None,
            frame: None,
        }
    }

    fn next_record(&mut self) -> Result<Option<PoseRecord>> {
        match self.pending.take() {
            Some(record) => Ok(Some(record)),
            None => self.records.next().transpose().map_err(Into::into),
        }
    }
}

impl<R: Read> DetectionSource for CsvDetections<R> {
    fn next_detections(&mut self, detections: &mut Vec<PoseSample>) -> Result<bool> {
        let first = match self.next_record()? {
            Some(record) => record,
            None => return Ok(false),
        };

        let frame = self.frame.map(|f| f + 1).unwrap_or(first.frame);
        self.frame = Some(frame);

        if first.frame < frame {
            return Err(anyhow!(
                "Frame {} recorded after frame {}",
                first.frame,
                frame - 1
            ));
        } else if first.frame > frame {
            // Gap in the recording - nothing was detected in this frame.
            self.pending = Some(first);
            return Ok(true);
        }

        detections.push(first.sample()?);

        while let Some(record) = self.next_record()? {
            if record.frame != frame {
                self.pending = Some(record);
                break;
            }
            detections.push(record.sample()?);
        }

        Ok(true)
    }

    fn frame(&self) -> Option<usize> {
        self.frame
    }
}

/// Open a file or an input stream.
///
/// `-` reads standard input. `tcp://host:port` connects to a remote recorder, while
/// `tcp://@:port` waits for one to connect.
pub fn open_input(input: &str) -> Result<Box<dyn Read + Send>> {
    if input == "-" {
        Ok(Box::new(io::stdin()))
    } else if let Some(input) = input.strip_prefix("tcp://") {
        let (addr, port) = input
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid format"))?;
        let port: u16 = str::parse(port)?;

        let stream = if addr == "@" {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            info!("Waiting for detections on port {port}");
            let (sock, addr) = listener.accept()?;
            info!("Accepted {addr}");
            sock
        } else {
            info!("Connecting to {input}");
            TcpStream::connect((addr, port))?
        };

        Ok(Box::new(stream))
    } else {
        std::fs::File::open(input)
            .map(|i| Box::new(i) as _)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const RECORDING: &str = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
1,3,0.1,0.2,0.3,1,0,0,0
1,4,1.0,0.0,0.0,0,1,0,0
2,3,0.1,0.2,0.3,2,0,0,0
5,4,1.0,0.0,0.0,0,0,1,0
";

    #[test]
    fn frames_are_grouped() {
        let mut source = CsvDetections::new(RECORDING.as_bytes());
        let mut detections = vec![];

        assert!(source.next_detections(&mut detections).unwrap());
        assert_eq!(source.frame(), Some(1));
        assert_eq!(
            detections.iter().map(|d| d.marker_id).collect::<Vec<_>>(),
            vec![3, 4]
        );
        assert_approx_eq!(detections[0].position.z, 0.3);

        detections.clear();
        assert!(source.next_detections(&mut detections).unwrap());
        assert_eq!(source.frame(), Some(2));
        assert_eq!(detections.len(), 1);
        // Recorded rotations get normalized.
        assert_approx_eq!(detections[0].rotation.w, 1.0);

        for frame in 3..5 {
            detections.clear();
            assert!(source.next_detections(&mut detections).unwrap());
            assert_eq!(source.frame(), Some(frame));
            assert!(detections.is_empty());
        }

        detections.clear();
        assert!(source.next_detections(&mut detections).unwrap());
        assert_eq!(source.frame(), Some(5));
        assert_eq!(detections[0].marker_id, 4);

        detections.clear();
        assert!(!source.next_detections(&mut detections).unwrap());
        assert!(detections.is_empty());
    }

    #[test]
    fn out_of_order_frames_fail() {
        let recording = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
2,3,0,0,0,1,0,0,0
1,3,0,0,0,1,0,0,0
";
        let mut source = CsvDetections::new(recording.as_bytes());
        let mut detections = vec![];

        assert!(source.next_detections(&mut detections).unwrap());
        assert!(source.next_detections(&mut detections).is_err());
    }

    #[test]
    fn malformed_rows_fail() {
        let recording = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
1,three,0,0,0,1,0,0,0
";
        let mut source = CsvDetections::new(recording.as_bytes());

        assert!(source.next_detections(&mut vec![]).is_err());
    }

    #[test]
    fn degenerate_values_fail() {
        let zero_rotation = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
1,1,0,0,0,0,0,0,0
2,1,0,0,0,1,0,0,0
";
        let mut source = CsvDetections::new(zero_rotation.as_bytes());
        let err = source.next_detections(&mut vec![]).unwrap_err();
        assert!(err.to_string().contains("marker 1"));

        let infinite_position = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
1,2,inf,0,0,1,0,0,0
";
        let mut source = CsvDetections::new(infinite_position.as_bytes());
        assert!(source.next_detections(&mut vec![]).is_err());

        let nan_rotation = "\
frame,marker_id,pos_x,pos_y,pos_z,rot_w,rot_i,rot_j,rot_k
1,3,0,0,0,NaN,0,0,0
";
        let mut source = CsvDetections::new(nan_rotation.as_bytes());
        assert!(source.next_detections(&mut vec![]).is_err());
    }

    #[test]
    fn record_round_trip() {
        let rotation = na::UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let record = PoseRecord::new(7, 2, na::Point3::new(1.0, 2.0, 3.0), rotation);
        let sample = record.sample().unwrap();

        assert_eq!(sample.marker_id, 2);
        assert_approx_eq!(sample.rotation.angle_to(&rotation), 0.0);
    }
}
