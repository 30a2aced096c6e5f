use crate::geometry::SE3;
use crate::imu::{ImuEntry, ImuReading, Timestamp};
use crate::io::{ImageRef, SensorStream};

/// Everything that became available at one global timestamp.
///
/// At least one field is set. A field is set only when that stream's next
/// sample carries exactly this timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizedSlot {
    pub timestamp_ns: Timestamp,
    pub imu: Option<ImuReading>,
    pub image: Option<ImageRef>,
    pub ground_truth: Option<SE3>,
}

/// A single sample of any stream type, stamped with its time.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Inertial(ImuEntry),
    Image { timestamp_ns: Timestamp, frame: ImageRef },
    Pose { timestamp_ns: Timestamp, pose: SE3 },
}

impl SynchronizedSlot {
    /// Split the slot into its individual samples (IMU, image, pose order).
    pub fn into_samples(self) -> Vec<Sample> {
        let ts = self.timestamp_ns;
        let mut samples = Vec::with_capacity(3);
        if let Some(reading) = self.imu {
            samples.push(Sample::Inertial(ImuEntry {
                timestamp_ns: ts,
                reading,
            }));
        }
        if let Some(frame) = self.image {
            samples.push(Sample::Image {
                timestamp_ns: ts,
                frame,
            });
        }
        if let Some(pose) = self.ground_truth {
            samples.push(Sample::Pose {
                timestamp_ns: ts,
                pose,
            });
        }
        samples
    }
}

/// Merges the IMU, camera and ground-truth streams into one timeline.
///
/// The current time is the smallest unconsumed timestamp over the streams
/// that still have samples. `peek` and `current_time` never touch the
/// streams; `advance` consumes exactly the samples reported by `peek`.
#[derive(Debug)]
pub struct Synchronizer<I, C, G> {
    imu: I,
    camera: C,
    ground_truth: G,
}

impl<I, C, G> Synchronizer<I, C, G>
where
    I: SensorStream<Sample = ImuReading>,
    C: SensorStream<Sample = ImageRef>,
    G: SensorStream<Sample = SE3>,
{
    pub fn new(imu: I, camera: C, ground_truth: G) -> Self {
        Self {
            imu,
            camera,
            ground_truth,
        }
    }

    pub fn imu(&self) -> &I {
        &self.imu
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// False once every stream is exhausted.
    pub fn has_next(&self) -> bool {
        self.imu.has_next() || self.camera.has_next() || self.ground_truth.has_next()
    }

    /// Minimum next-unconsumed timestamp, `None` once exhausted.
    pub fn current_time(&self) -> Option<Timestamp> {
        [
            self.imu.current_time(),
            self.camera.current_time(),
            self.ground_truth.current_time(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// The slot at the current time, `None` once exhausted.
    pub fn peek(&self) -> Option<SynchronizedSlot> {
        let now = self.current_time()?;
        Some(SynchronizedSlot {
            timestamp_ns: now,
            imu: sample_at(&self.imu, now),
            image: sample_at(&self.camera, now),
            ground_truth: sample_at(&self.ground_truth, now),
        })
    }

    /// Consume the current slot.
    pub fn advance(&mut self) {
        let Some(now) = self.current_time() else {
            return;
        };
        if self.imu.current_time() == Some(now) {
            self.imu.advance();
        }
        if self.camera.current_time() == Some(now) {
            self.camera.advance();
        }
        if self.ground_truth.current_time() == Some(now) {
            self.ground_truth.advance();
        }
    }
}

impl<I, C, G> Iterator for Synchronizer<I, C, G>
where
    I: SensorStream<Sample = ImuReading>,
    C: SensorStream<Sample = ImageRef>,
    G: SensorStream<Sample = SE3>,
{
    type Item = SynchronizedSlot;

    fn next(&mut self) -> Option<SynchronizedSlot> {
        let slot = self.peek()?;
        self.advance();
        Some(slot)
    }
}

fn sample_at<S: SensorStream>(stream: &S, now: Timestamp) -> Option<S::Sample> {
    if stream.current_time() == Some(now) {
        stream.current_sample().cloned()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use rand::Rng;

    use crate::io::VecStream;

    fn reading(x: f64) -> ImuReading {
        ImuReading::new(Vector3::new(x, 0.0, 9.81), Vector3::zeros())
    }

    fn frame(ts: Timestamp) -> ImageRef {
        ImageRef {
            path: format!("{ts}.png").into(),
        }
    }

    fn pose(x: f64) -> SE3 {
        SE3 {
            translation: Vector3::new(x, 0.0, 0.0),
            ..SE3::identity()
        }
    }

    #[test]
    fn test_slots_group_equal_timestamps() {
        let imu = VecStream::new("imu0", vec![(0, reading(0.0)), (5, reading(1.0)), (10, reading(2.0))]);
        let cam = VecStream::new("cam0", vec![(5, frame(5))]);
        let gt = VecStream::new("gt0", vec![(3, pose(0.3)), (10, pose(1.0))]);
        let mut sync = Synchronizer::new(imu, cam, gt);

        let slots: Vec<_> = sync.by_ref().collect();
        let times: Vec<_> = slots.iter().map(|s| s.timestamp_ns).collect();
        assert_eq!(times, vec![0, 3, 5, 10]);

        assert!(slots[0].imu.is_some() && slots[0].image.is_none() && slots[0].ground_truth.is_none());
        assert!(slots[1].imu.is_none() && slots[1].ground_truth.is_some());
        assert!(slots[2].imu.is_some() && slots[2].image.is_some());
        assert!(slots[3].imu.is_some() && slots[3].ground_truth.is_some());

        assert!(!sync.has_next());
        assert!(sync.peek().is_none());
        assert!(sync.current_time().is_none());
    }

    #[test]
    fn test_peek_is_idempotent() {
        let imu = VecStream::new("imu0", vec![(1, reading(0.0)), (2, reading(1.0))]);
        let sync = Synchronizer::new(imu, VecStream::empty("cam0"), VecStream::empty("gt0"));

        let first = sync.peek();
        assert_eq!(sync.current_time(), Some(1));
        assert_eq!(sync.peek(), first);
        assert_eq!(sync.imu().remaining(), 2);
    }

    #[test]
    fn test_random_interleavings_preserve_order_and_count() {
        let mut rng = rand::thread_rng();

        for _ in 0..20 {
            let mut make_times = |n: usize, max_step: u64| {
                let mut t = rng.gen_range(0..50);
                (0..n)
                    .map(|_| {
                        t += rng.gen_range(0..=max_step);
                        t
                    })
                    .collect::<Vec<Timestamp>>()
            };
            let imu_times = make_times(200, 5);
            let cam_times = make_times(30, 40);
            let gt_times = make_times(60, 20);

            // Streams may repeat a timestamp; only distinct ones are meaningful.
            let dedup = |mut v: Vec<Timestamp>| {
                v.dedup();
                v
            };
            let imu_times = dedup(imu_times);
            let cam_times = dedup(cam_times);
            let gt_times = dedup(gt_times);

            let imu = VecStream::new(
                "imu0",
                imu_times.iter().map(|&t| (t, reading(t as f64))).collect(),
            );
            let cam = VecStream::new("cam0", cam_times.iter().map(|&t| (t, frame(t))).collect());
            let gt = VecStream::new("gt0", gt_times.iter().map(|&t| (t, pose(t as f64))).collect());

            let mut seen_imu = Vec::new();
            let mut seen_cam = Vec::new();
            let mut seen_gt = Vec::new();
            let mut last = 0;
            for slot in Synchronizer::new(imu, cam, gt) {
                assert!(slot.timestamp_ns >= last);
                last = slot.timestamp_ns;
                assert!(slot.imu.is_some() || slot.image.is_some() || slot.ground_truth.is_some());
                for sample in slot.into_samples() {
                    match sample {
                        Sample::Inertial(entry) => {
                            assert_eq!(entry.reading.accel.x, entry.timestamp_ns as f64);
                            seen_imu.push(entry.timestamp_ns);
                        }
                        Sample::Image { timestamp_ns, .. } => seen_cam.push(timestamp_ns),
                        Sample::Pose { timestamp_ns, .. } => seen_gt.push(timestamp_ns),
                    }
                }
            }

            assert_eq!(seen_imu, imu_times);
            assert_eq!(seen_cam, cam_times);
            assert_eq!(seen_gt, gt_times);
        }
    }
}
