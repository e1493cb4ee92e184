//! Zoom range allocation for tile layers.
//!
//! Each administrative level is shown from the end of the previous level's
//! range until the next finer level's polygons reach a reference on-screen
//! size. The reference is a 20 km² polygon at zoom 9; a polygon four times
//! smaller reaches it one zoom level later.
//!
//! ```text
//! zoom = ceil(BASE_ZOOM_VALUE - 0.5 * log2(mean_area))
//!
//! ADM0      ADM1          buildings
//! [0 .. z1] [z1+1 .. z2] [z2+1 .. MAX_ZOOM]
//! ```
//!
//! Levels whose zoom lands above [`ADMIN_ZOOM_THRESHOLD`] are not rendered.

use std::fmt;

use crate::country::{AdminLevel, Country};

/// Highest zoom generated for the building layer.
pub const MAX_ZOOM: u8 = 17;

/// Levels whose computed zoom exceeds this are dropped.
pub const ADMIN_ZOOM_THRESHOLD: i32 = 10;

/// Mean polygon area (m²) that reaches the reference size at zoom 9.
const REFERENCE_AREA: f64 = 20_000_000.0;

/// Zoom at which a polygon of [`REFERENCE_AREA`] reaches the reference size.
const REFERENCE_ZOOM: f64 = 9.0;

/// `0.5 * log2(20_000_000) + 9`.
pub fn base_zoom_value() -> f64 {
    0.5 * REFERENCE_AREA.log2() + REFERENCE_ZOOM
}

/// Zoom at which polygons of `mean_area` reach the reference size.
///
/// Returns `None` for areas that cannot be placed (zero, negative, NaN).
pub fn zoom_for_area(mean_area: f64) -> Option<i32> {
    if !mean_area.is_finite() || mean_area <= 0.0 {
        return None;
    }
    Some((base_zoom_value() - 0.5 * mean_area.log2()).ceil() as i32)
}

/// Upper bound of a zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxZoom {
    Level(u8),
    /// Let the tiler guess, extending zooms while features are still dropped.
    Guess,
}

impl fmt::Display for MaxZoom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxZoom::Level(z) => write!(f, "{}", z),
            MaxZoom::Guess => f.write_str("g"),
        }
    }
}

/// Inclusive zoom range for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: MaxZoom,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Self {
        Self {
            min,
            max: MaxZoom::Level(max),
        }
    }
}

/// Zoom ranges for every rendered layer of one country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomPlan {
    /// Admin layers to render, coarsest first.
    pub admin: Vec<(AdminLevel, ZoomRange)>,
    pub buildings: ZoomRange,
}

/// Allocate zoom ranges from per-level mean polygon areas.
///
/// `mean_area` is asked for every level after ADM0. The i-th admitted range
/// goes to the i-th level, and the building layer starts one zoom above the
/// last admitted range (zoom 0 when nothing is admitted).
pub fn allocate<F>(mean_area: F, buildings_max: MaxZoom) -> ZoomPlan
where
    F: Fn(AdminLevel) -> Option<f64>,
{
    let mut admin = Vec::new();
    let mut prev_zoom: i32 = -1;

    for level in AdminLevel::ALL.iter().skip(1) {
        let Some(zoom) = mean_area(*level).and_then(zoom_for_area) else {
            continue;
        };
        // An empty range (finer level with larger polygons) is dropped too.
        if zoom > ADMIN_ZOOM_THRESHOLD || zoom <= prev_zoom {
            continue;
        }
        let target = AdminLevel::ALL[admin.len()];
        admin.push((target, ZoomRange::new(clamp_zoom(prev_zoom + 1), clamp_zoom(zoom))));
        prev_zoom = zoom;
    }

    ZoomPlan {
        admin,
        buildings: ZoomRange {
            min: clamp_zoom(prev_zoom + 1),
            max: buildings_max,
        },
    }
}

/// Allocate zoom ranges for a country from its downloaded admin levels.
pub fn allocate_for_country(country: &Country, buildings_max: MaxZoom) -> ZoomPlan {
    allocate(|level| country.mean_area(level), buildings_max)
}

fn clamp_zoom(zoom: i32) -> u8 {
    zoom.clamp(0, i32::from(MAX_ZOOM)) as u8
}
