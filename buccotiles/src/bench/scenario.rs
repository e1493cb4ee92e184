//! Random bounding boxes and timing statistics for the filter benchmark.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Axis-aligned extent `minx, miny, maxx, maxy` in the data's CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// Square boxes of one side length.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub size: f64,
    pub boxes: Vec<Extent>,
}

/// Generate `iterations` boxes per size, fully inside `extent`.
///
/// The same seed gives the same boxes. When the extent is narrower than a
/// box along an axis, the box starts at the extent's minimum on that axis.
pub fn generate(extent: Extent, sizes: &[f64], iterations: usize, seed: u64) -> Vec<Scenario> {
    let mut rng = StdRng::seed_from_u64(seed);
    sizes
        .iter()
        .map(|&size| {
            let boxes = (0..iterations)
                .map(|_| {
                    let x = random_origin(&mut rng, extent.min_x, extent.max_x - size);
                    let y = random_origin(&mut rng, extent.min_y, extent.max_y - size);
                    Extent::new(x, y, x + size, y + size)
                })
                .collect();
            Scenario { size, boxes }
        })
        .collect()
}

fn random_origin(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..high)
    } else {
        low
    }
}

/// Average, fastest and slowest of a set of runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingStats {
    pub avg: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl TimingStats {
    /// `None` for an empty set.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let min = *samples.iter().min()?;
        let max = *samples.iter().max()?;
        let total: Duration = samples.iter().sum();
        Some(Self {
            avg: total / samples.len() as u32,
            min,
            max,
        })
    }
}

impl fmt::Display for TimingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Avg: {:.4} s | (Min: {:.4} s | Max: {:.4} s)",
            self.avg.as_secs_f64(),
            self.min.as_secs_f64(),
            self.max.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_seed_same_boxes() {
        let extent = Extent::new(0.0, 0.0, 100_000.0, 50_000.0);
        let a = generate(extent, &[500.0, 5000.0], 10, 7);
        let b = generate(extent, &[500.0, 5000.0], 10, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].boxes.len(), 10);

        let c = generate(extent, &[500.0, 5000.0], 10, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn test_narrow_extent_pins_box_to_minimum() {
        let extent = Extent::new(10.0, 20.0, 110.0, 120.0);
        let scenarios = generate(extent, &[20_000.0], 3, 1);
        for b in &scenarios[0].boxes {
            assert_eq!(b.min_x, 10.0);
            assert_eq!(b.min_y, 20.0);
            assert_eq!(b.max_x, 20_010.0);
        }
    }

    #[test]
    fn test_timing_stats() {
        let samples = [
            Duration::from_millis(10),
            Duration::from_millis(30),
            Duration::from_millis(20),
        ];
        let stats = TimingStats::from_samples(&samples).unwrap();
        assert_eq!(stats.avg, Duration::from_millis(20));
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(30));
        assert!(TimingStats::from_samples(&[]).is_none());
    }

    proptest! {
        #[test]
        fn boxes_stay_inside_extent(
            min_x in -1.0e6f64..1.0e6,
            min_y in -1.0e6f64..1.0e6,
            width in 20_000.0f64..2.0e6,
            height in 20_000.0f64..2.0e6,
            seed in any::<u64>(),
        ) {
            let extent = Extent::new(min_x, min_y, min_x + width, min_y + height);
            for scenario in generate(extent, &[500.0, 5000.0, 20_000.0], 5, seed) {
                for b in scenario.boxes {
                    prop_assert!(b.min_x >= extent.min_x && b.max_x <= extent.max_x + 1e-6);
                    prop_assert!(b.min_y >= extent.min_y && b.max_y <= extent.max_y + 1e-6);
                    prop_assert!((b.max_x - b.min_x - scenario.size).abs() < 1e-6);
                }
            }
        }
    }
}
